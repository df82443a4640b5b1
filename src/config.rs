// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime configuration.
//!
//! [`DaylightConfig`] is read from a JSON document with camelCase keys.
//! Every option has a default, so an empty object is a valid configuration.
//! Problems with individual values never abort startup:
//! [`DaylightConfig::sanitize`] replaces them with defaults, logs a warning
//! and reports what it changed as [`ConfigIssue`]s.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::delivery::RetryPolicy;
use crate::error::{ConfigError, ValueError};
use crate::solar::SolarConfig;
use crate::types::{Kelvin, LightId, TemperatureRange};

#[cfg(feature = "hue")]
use crate::gateway::HueBridgeConfig;

/// Configuration of a daylight sync instance.
///
/// # Examples
///
/// ```
/// use daylight_sync::config::DaylightConfig;
///
/// let config = DaylightConfig::from_json(
///     r#"{
///         "bridgeAddress": "192.168.1.20",
///         "apiToken": "app-key",
///         "latitude": 52.52,
///         "longitude": 13.405,
///         "warmTempK": 2200,
///         "excludedLightIds": ["porch"]
///     }"#,
/// )?;
/// assert_eq!(config.warm_temp_k, 2200);
/// assert_eq!(config.cool_temp_k, 6500);
/// # Ok::<(), daylight_sync::error::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaylightConfig {
    /// Gateway host or base URL.
    #[serde(alias = "bridgeIp")]
    pub bridge_address: Option<String>,
    /// Gateway application key.
    pub api_token: Option<String>,
    /// Latitude in degrees, positive north.
    pub latitude: Option<f64>,
    /// Longitude in degrees, positive east.
    pub longitude: Option<f64>,
    /// Milliseconds between automatic recomputations.
    #[serde(alias = "updateInterval")]
    pub update_interval_ms: u64,
    /// Warm end of the range in Kelvin.
    #[serde(alias = "warmTemp")]
    pub warm_temp_k: u32,
    /// Cool end of the range in Kelvin.
    #[serde(alias = "coolTemp")]
    pub cool_temp_k: u32,
    /// Quiet period before a target change is delivered.
    pub input_debounce_ms: u64,
    /// Exponent applied to the normalized sun altitude.
    pub curve_exponent: f64,
    /// Whether automatic mode is enabled at startup.
    pub default_auto_mode: bool,
    /// Lights that never receive updates.
    #[serde(alias = "excludedLights")]
    pub excluded_light_ids: Vec<String>,
    /// Cadence of the delivery worker.
    pub queue_tick_ms: u64,
    /// Retries after a transient delivery failure.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub retry_base_delay_ms: u64,
    /// Timeout of a single gateway request.
    pub request_timeout_ms: u64,
}

impl DaylightConfig {
    /// Default `updateIntervalMs`.
    pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 300_000;
    /// Default `warmTempK`.
    pub const DEFAULT_WARM_TEMP_K: u32 = 2700;
    /// Default `coolTempK`.
    pub const DEFAULT_COOL_TEMP_K: u32 = 6500;
    /// Default `inputDebounceMs`.
    pub const DEFAULT_INPUT_DEBOUNCE_MS: u64 = 750;
    /// Default `curveExponent`.
    pub const DEFAULT_CURVE_EXPONENT: f64 = 3.0;
    /// Default `queueTickMs`.
    pub const DEFAULT_QUEUE_TICK_MS: u64 = 100;
    /// Default `retryBaseDelayMs`.
    pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
    /// Default `requestTimeoutMs`.
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Json` if the document is not valid JSON or a
    /// value has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds a configuration from an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Json` if a value has the wrong type.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Sets the gateway address and key.
    #[must_use]
    pub fn with_bridge(mut self, address: impl Into<String>, api_token: impl Into<String>) -> Self {
        self.bridge_address = Some(address.into());
        self.api_token = Some(api_token.into());
        self
    }

    /// Sets the geographic location.
    #[must_use]
    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Sets the warm and cool bounds in Kelvin.
    #[must_use]
    pub fn with_temperature_range(mut self, warm_k: u32, cool_k: u32) -> Self {
        self.warm_temp_k = warm_k;
        self.cool_temp_k = cool_k;
        self
    }

    /// Sets the interval between automatic recomputations.
    #[must_use]
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval_ms = millis(interval);
        self
    }

    /// Sets the input debounce window.
    #[must_use]
    pub fn with_input_debounce(mut self, debounce: Duration) -> Self {
        self.input_debounce_ms = millis(debounce);
        self
    }

    /// Sets the curve exponent.
    #[must_use]
    pub fn with_curve_exponent(mut self, exponent: f64) -> Self {
        self.curve_exponent = exponent;
        self
    }

    /// Sets whether automatic mode starts enabled.
    #[must_use]
    pub fn with_default_auto_mode(mut self, enabled: bool) -> Self {
        self.default_auto_mode = enabled;
        self
    }

    /// Excludes a light from updates.
    #[must_use]
    pub fn with_excluded_light(mut self, light: impl Into<String>) -> Self {
        self.excluded_light_ids.push(light.into());
        self
    }

    /// Sets the cadence of the delivery worker.
    #[must_use]
    pub fn with_queue_tick(mut self, cadence: Duration) -> Self {
        self.queue_tick_ms = millis(cadence);
        self
    }

    /// Sets the retry limit and the delay before the first retry.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay_ms = millis(base_delay);
        self
    }

    /// Sets the timeout of a single gateway request.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = millis(timeout);
        self
    }

    /// Replaces unusable values with their defaults.
    ///
    /// Each problem is logged at warn level and returned. A missing location
    /// or missing credentials are reported but left as they are: the solar
    /// model falls back to the midpoint and the gateway reports itself as
    /// not configured.
    pub fn sanitize(&mut self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => {
                let valid = lat.is_finite()
                    && lon.is_finite()
                    && (-90.0..=90.0).contains(&lat)
                    && (-180.0..=180.0).contains(&lon);
                if !valid {
                    issues.push(ConfigIssue::InvalidLocation {
                        latitude: lat,
                        longitude: lon,
                    });
                    self.latitude = None;
                    self.longitude = None;
                }
            }
            _ => issues.push(ConfigIssue::MissingLocation),
        }

        let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        if !has(&self.bridge_address) || !has(&self.api_token) {
            issues.push(ConfigIssue::MissingCredentials);
        }

        if self.temperature_range().is_err() {
            issues.push(ConfigIssue::InvalidRange {
                warm: self.warm_temp_k,
                cool: self.cool_temp_k,
            });
            self.warm_temp_k = Self::DEFAULT_WARM_TEMP_K;
            self.cool_temp_k = Self::DEFAULT_COOL_TEMP_K;
        }

        if !(self.curve_exponent.is_finite() && self.curve_exponent > 0.0) {
            issues.push(ConfigIssue::InvalidCurveExponent(self.curve_exponent));
            self.curve_exponent = Self::DEFAULT_CURVE_EXPONENT;
        }

        for (option, value, default) in [
            (
                "updateIntervalMs",
                &mut self.update_interval_ms,
                Self::DEFAULT_UPDATE_INTERVAL_MS,
            ),
            ("queueTickMs", &mut self.queue_tick_ms, Self::DEFAULT_QUEUE_TICK_MS),
            (
                "requestTimeoutMs",
                &mut self.request_timeout_ms,
                Self::DEFAULT_REQUEST_TIMEOUT_MS,
            ),
        ] {
            if *value == 0 {
                issues.push(ConfigIssue::ZeroDuration { option });
                *value = default;
            }
        }

        for issue in &issues {
            tracing::warn!(issue = %issue, "Configuration problem, using fallback");
        }
        issues
    }

    /// Returns the configured temperature range.
    ///
    /// # Errors
    ///
    /// Returns a `ValueError` for an inverted range or a bound outside
    /// `TemperatureRange::MIN_KELVIN..=MAX_KELVIN`. Never fails after
    /// [`sanitize`](Self::sanitize).
    pub fn temperature_range(&self) -> Result<TemperatureRange, ValueError> {
        TemperatureRange::new(Kelvin::new(self.warm_temp_k)?, Kelvin::new(self.cool_temp_k)?)
    }

    /// Returns the parameters of the solar model.
    ///
    /// An unset coordinate is passed on as zero, which the model treats as
    /// "no location".
    ///
    /// # Errors
    ///
    /// Returns a `ValueError` for an invalid range, exponent or interval.
    /// Never fails after [`sanitize`](Self::sanitize).
    pub fn solar_config(&self) -> Result<SolarConfig, ValueError> {
        SolarConfig::new(
            self.latitude.unwrap_or(0.0),
            self.longitude.unwrap_or(0.0),
            self.temperature_range()?,
            self.curve_exponent,
        )?
        .with_update_interval(self.update_interval())
    }

    /// Returns the retry policy of the delivery queue.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(self.max_retries)
            .with_base_delay(Duration::from_millis(self.retry_base_delay_ms))
    }

    /// Returns the interval between automatic recomputations.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Returns the input debounce window.
    #[must_use]
    pub fn input_debounce(&self) -> Duration {
        Duration::from_millis(self.input_debounce_ms)
    }

    /// Returns the cadence of the delivery worker.
    #[must_use]
    pub fn queue_tick(&self) -> Duration {
        Duration::from_millis(self.queue_tick_ms)
    }

    /// Returns the timeout of a single gateway request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the excluded lights.
    pub fn excluded_lights(&self) -> impl Iterator<Item = LightId> + '_ {
        self.excluded_light_ids.iter().map(|id| LightId::new(id.as_str()))
    }

    /// Returns the Hue bridge settings, if address and key are both set.
    #[cfg(feature = "hue")]
    #[must_use]
    pub fn hue_bridge(&self) -> Option<HueBridgeConfig> {
        let address = self.bridge_address.as_deref().filter(|a| !a.trim().is_empty())?;
        let token = self.api_token.as_deref().filter(|t| !t.trim().is_empty())?;
        Some(HueBridgeConfig::new(address, token).with_timeout(self.request_timeout()))
    }
}

impl Default for DaylightConfig {
    fn default() -> Self {
        Self {
            bridge_address: None,
            api_token: None,
            latitude: None,
            longitude: None,
            update_interval_ms: Self::DEFAULT_UPDATE_INTERVAL_MS,
            warm_temp_k: Self::DEFAULT_WARM_TEMP_K,
            cool_temp_k: Self::DEFAULT_COOL_TEMP_K,
            input_debounce_ms: Self::DEFAULT_INPUT_DEBOUNCE_MS,
            curve_exponent: Self::DEFAULT_CURVE_EXPONENT,
            default_auto_mode: true,
            excluded_light_ids: Vec::new(),
            queue_tick_ms: Self::DEFAULT_QUEUE_TICK_MS,
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: Self::DEFAULT_RETRY_BASE_DELAY_MS,
            request_timeout_ms: Self::DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

/// A configuration value that was unusable.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigIssue {
    /// Latitude or longitude is unset or zero.
    MissingLocation,
    /// Coordinates are outside the valid range; they were cleared.
    InvalidLocation {
        /// Configured latitude.
        latitude: f64,
        /// Configured longitude.
        longitude: f64,
    },
    /// Gateway address or key is missing.
    MissingCredentials,
    /// Bounds were crossed or outside 1000K-40000K; the default range was
    /// used.
    InvalidRange {
        /// Configured warm bound.
        warm: u32,
        /// Configured cool bound.
        cool: u32,
    },
    /// Exponent was not positive; the default was used.
    InvalidCurveExponent(f64),
    /// A duration was zero; the default was used.
    ZeroDuration {
        /// The option name as it appears in the document.
        option: &'static str,
    },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLocation => {
                f.write_str("latitude/longitude not set, using midpoint temperature")
            }
            Self::InvalidLocation {
                latitude,
                longitude,
            } => write!(
                f,
                "location ({latitude}, {longitude}) is out of range, using midpoint temperature"
            ),
            Self::MissingCredentials => f.write_str("bridge address or API token not set"),
            Self::InvalidRange { warm, cool } => write!(
                f,
                "temperature range {warm}K-{cool}K is invalid, using {}K-{}K",
                DaylightConfig::DEFAULT_WARM_TEMP_K,
                DaylightConfig::DEFAULT_COOL_TEMP_K
            ),
            Self::InvalidCurveExponent(value) => write!(
                f,
                "curve exponent {value} is not positive, using {}",
                DaylightConfig::DEFAULT_CURVE_EXPONENT
            ),
            Self::ZeroDuration { option } => write!(f, "{option} must be positive, using default"),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
