// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for color temperature control.
//!
//! Each type ensures values are within their valid ranges at construction
//! time.
//!
//! # Types
//!
//! - [`Kelvin`] - Color temperature in Kelvin
//! - [`Mired`] - Color temperature in mireds, as spoken by gateways
//! - [`SliderPosition`] - 1-100% projection of the configured range
//! - [`TemperatureRange`] - Warm and cool bounds with conversions
//! - [`LightId`] - Gateway-assigned light identifier

mod light_id;
mod slider;
mod temperature;

pub use light_id::LightId;
pub use slider::SliderPosition;
pub use temperature::{Kelvin, Mired, TemperatureRange};
