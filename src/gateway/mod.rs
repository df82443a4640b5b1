// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Light control gateways.
//!
//! A gateway is the bridge between this library and the physical lights. It
//! lists the lights it knows about and applies color temperatures to them.
//!
//! # Gateways
//!
//! - [`HueBridgeClient`]: Philips Hue bridge over the CLIP v2 REST API
//!   (requires the `hue` feature)

#[cfg(feature = "hue")]
mod hue;

#[cfg(feature = "hue")]
pub use hue::{HueBridgeClient, HueBridgeConfig};

use std::future::Future;

use crate::error::DeliveryError;
use crate::types::{LightId, Mired};

/// A light as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightInfo {
    /// Gateway identifier.
    pub id: LightId,
    /// Human readable name.
    pub name: String,
    /// Whether the light is currently on.
    pub is_on: bool,
    /// Current color temperature, if the light supports and reports one.
    pub color_temperature: Option<Mired>,
}

/// Trait for gateways that can read and set light color temperatures.
///
/// Implementations classify their failures through [`DeliveryError`]; the
/// delivery queue retries only those for which
/// [`DeliveryError::is_transient`] is true.
pub trait LightGateway: Send + Sync {
    /// Lists all lights known to the gateway.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the gateway cannot be reached or answers
    /// with something unexpected.
    fn list_lights(&self) -> impl Future<Output = Result<Vec<LightInfo>, DeliveryError>> + Send;

    /// Sets the color temperature of a single light.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` describing why the light was not updated.
    fn set_color_temperature(
        &self,
        light: &LightId,
        mired: Mired,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
