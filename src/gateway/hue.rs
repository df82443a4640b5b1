// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Philips Hue bridge gateway (CLIP v2 REST API).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;
use crate::gateway::{LightGateway, LightInfo};
use crate::types::{LightId, Mired};

/// Header carrying the application key on every CLIP v2 request.
const APPLICATION_KEY_HEADER: &str = "hue-application-key";

// ============================================================================
// HueBridgeConfig
// ============================================================================

/// Connection parameters for a Hue bridge.
///
/// Bridges serve HTTPS with a self-signed certificate, so certificate
/// validation is disabled by default.
///
/// # Examples
///
/// ```
/// use daylight_sync::gateway::HueBridgeConfig;
/// use std::time::Duration;
///
/// let config = HueBridgeConfig::new("192.168.1.20", "app-key")
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(config.base_url(), "https://192.168.1.20");
/// ```
#[derive(Debug, Clone)]
pub struct HueBridgeConfig {
    address: String,
    api_key: String,
    timeout: Duration,
    accept_invalid_certs: bool,
}

impl HueBridgeConfig {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration for the bridge at `address`.
    ///
    /// The address may be a bare host (HTTPS is assumed) or a full base URL
    /// such as `http://127.0.0.1:8080`.
    #[must_use]
    pub fn new(address: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            api_key: api_key.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            accept_invalid_certs: true,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requires a valid certificate chain from the bridge.
    #[must_use]
    pub fn with_strict_certificates(mut self) -> Self {
        self.accept_invalid_certs = false;
        self
    }

    /// Returns the bridge address as configured.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the base URL from this configuration.
    #[must_use]
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("https://{address}")
        }
    }

    /// Creates a [`HueBridgeClient`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn into_client(self) -> crate::Result<HueBridgeClient> {
        HueBridgeClient::new(self)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ResourceResponse<T> {
    #[serde(default)]
    errors: Vec<ResourceError>,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ResourceError {
    description: String,
}

#[derive(Debug, Deserialize)]
struct HueLight {
    id: String,
    #[serde(default)]
    metadata: Option<HueMetadata>,
    #[serde(default)]
    on: Option<HueOn>,
    #[serde(default)]
    color_temperature: Option<HueColorTemperature>,
}

#[derive(Debug, Deserialize)]
struct HueMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct HueOn {
    on: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct HueColorTemperature {
    #[serde(default)]
    mirek: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ColorTemperatureUpdate {
    color_temperature: HueColorTemperature,
}

impl From<HueLight> for LightInfo {
    fn from(light: HueLight) -> Self {
        Self {
            id: LightId::new(light.id),
            name: light
                .metadata
                .map_or_else(|| "Unknown".to_string(), |m| m.name),
            is_on: light.on.is_some_and(|on| on.on),
            color_temperature: light
                .color_temperature
                .and_then(|ct| ct.mirek)
                .and_then(|mirek| Mired::new(mirek).ok()),
        }
    }
}

// ============================================================================
// HueBridgeClient
// ============================================================================

/// Gateway talking to a Hue bridge.
///
/// # Examples
///
/// ```no_run
/// use daylight_sync::gateway::{HueBridgeConfig, LightGateway};
///
/// # async fn example() -> daylight_sync::Result<()> {
/// let bridge = HueBridgeConfig::new("192.168.1.20", "app-key").into_client()?;
/// for light in bridge.list_lights().await? {
///     println!("{} ({})", light.name, light.id);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HueBridgeClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HueBridgeClient {
    /// Creates a client from a bridge configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: HueBridgeConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            base_url: config.base_url(),
            api_key: config.api_key,
            client,
        })
    }

    /// Returns the base URL of the bridge.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn lights_url(&self) -> String {
        format!("{}/clip/v2/resource/light", self.base_url)
    }

    fn light_url(&self, light: &LightId) -> String {
        format!(
            "{}/clip/v2/resource/light/{}",
            self.base_url,
            urlencoding::encode(light.as_str())
        )
    }

    fn ensure_configured(&self) -> Result<(), DeliveryError> {
        let host = self
            .base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        if host.is_empty() {
            return Err(DeliveryError::NotConfigured(
                "bridge address is not set".to_string(),
            ));
        }
        if self.api_key.is_empty() {
            return Err(DeliveryError::NotConfigured(
                "API token is not set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Maps a transport failure to a delivery error.
fn transport_error(err: &reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout
    } else if err.is_decode() {
        DeliveryError::InvalidResponse(err.to_string())
    } else {
        DeliveryError::Network(err.to_string())
    }
}

/// Maps an unsuccessful status code to a delivery error.
fn status_error(status: StatusCode, body: &str) -> DeliveryError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => DeliveryError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DeliveryError::AuthenticationFailed,
        s if s.is_server_error() => DeliveryError::Server { status: s.as_u16() },
        s => {
            let message = serde_json::from_str::<ResourceResponse<serde_json::Value>>(body)
                .ok()
                .and_then(|r| r.errors.into_iter().next())
                .map_or_else(
                    || s.canonical_reason().unwrap_or("Unknown").to_string(),
                    |e| e.description,
                );
            DeliveryError::Rejected {
                status: s.as_u16(),
                message,
            }
        }
    }
}

impl LightGateway for HueBridgeClient {
    async fn list_lights(&self) -> Result<Vec<LightInfo>, DeliveryError> {
        self.ensure_configured()?;

        let url = self.lights_url();
        tracing::debug!(url = %url, "Listing lights");

        let response = self
            .client
            .get(&url)
            .header(APPLICATION_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(&e))?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let parsed: ResourceResponse<HueLight> = serde_json::from_str(&body)
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))?;

        if let Some(error) = parsed.errors.first() {
            return Err(DeliveryError::InvalidResponse(error.description.clone()));
        }

        let lights: Vec<LightInfo> = parsed.data.into_iter().map(LightInfo::from).collect();
        tracing::debug!(count = lights.len(), "Received light list");
        Ok(lights)
    }

    async fn set_color_temperature(
        &self,
        light: &LightId,
        mired: Mired,
    ) -> Result<(), DeliveryError> {
        self.ensure_configured()?;

        let url = self.light_url(light);
        let body = ColorTemperatureUpdate {
            color_temperature: HueColorTemperature {
                mirek: Some(mired.value()),
            },
        };

        tracing::debug!(url = %url, mirek = mired.value(), "Setting color temperature");

        let response = self
            .client
            .put(&url)
            .header(APPLICATION_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}
