// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the daylight sync library.
//!
//! Errors fall into three groups: value validation, configuration, and
//! delivery to the light gateway. Delivery errors are classified as
//! transient or permanent, which drives the retry behaviour of the
//! [`DeliveryQueue`](crate::delivery::DeliveryQueue).

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Configuration could not be read.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error occurred while talking to the light gateway.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// The HTTP client could not be created.
    #[cfg(feature = "hue")]
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: u32,
        /// Maximum allowed value.
        max: u32,
        /// The actual value that was provided.
        actual: u32,
    },

    /// A temperature of zero cannot be converted between units.
    #[error("color temperature must be non-zero")]
    ZeroTemperature,

    /// The warm bound is not strictly below the cool bound.
    #[error("warm temperature {warm}K must be below cool temperature {cool}K")]
    InvertedRange {
        /// Configured warm bound in Kelvin.
        warm: u32,
        /// Configured cool bound in Kelvin.
        cool: u32,
    },

    /// A floating-point parameter must be finite and positive.
    #[error("{name} must be a positive number, got {value}")]
    NotPositive {
        /// The parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// Errors related to configuration.
///
/// Only failures to read the document are surfaced as errors. Semantic
/// problems are reported as [`ConfigIssue`](crate::config::ConfigIssue)s and
/// replaced by defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for this schema.
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by a [`LightGateway`](crate::gateway::LightGateway).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The gateway asked us to slow down (HTTP 429).
    #[error("rate limit exceeded")]
    RateLimited,

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// Connection refused, reset, or otherwise broken.
    #[error("network error: {0}")]
    Network(String),

    /// The gateway reported an internal failure.
    #[error("gateway returned server error {status}")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// The gateway rejected our credentials.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The gateway refused the request as malformed or unknown.
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Description returned by the gateway.
        message: String,
    },

    /// The gateway answered with something we could not understand.
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),

    /// No gateway address or credentials are configured.
    #[error("gateway is not configured: {0}")]
    NotConfigured(String),
}

impl DeliveryError {
    /// Returns true if retrying the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::Network(_) | Self::Server { .. }
        )
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
