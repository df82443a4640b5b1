// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Color temperature units and the configured warm/cool range.
//!
//! Color temperature is tracked internally in Kelvin. Gateways and host
//! platforms speak mireds (reciprocal megakelvin), and users often see a
//! 1-100% slider. [`TemperatureRange`] owns the projections between these.

use std::fmt;

use crate::error::ValueError;

use super::SliderPosition;

/// Rounds `1_000_000 / value` to the nearest integer, never below one.
fn reciprocal_mega(value: u32) -> u32 {
    ((1_000_000 + value / 2) / value).max(1)
}

/// Color temperature in Kelvin.
///
/// Lower values are warmer (more orange), higher values are cooler (bluer).
///
/// # Examples
///
/// ```
/// use daylight_sync::types::Kelvin;
///
/// let neutral = Kelvin::new(4000).unwrap();
/// assert_eq!(neutral.to_mired().value(), 250);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Kelvin(u32);

impl Kelvin {
    /// Creates a Kelvin value.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::ZeroTemperature` for zero.
    pub fn new(value: u32) -> Result<Self, ValueError> {
        if value == 0 {
            return Err(ValueError::ZeroTemperature);
        }
        Ok(Self(value))
    }

    /// Returns the raw Kelvin value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Converts to mireds using `round(1_000_000 / kelvin)`.
    #[must_use]
    pub fn to_mired(&self) -> Mired {
        Mired(reciprocal_mega(self.0))
    }
}

impl fmt::Display for Kelvin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}K", self.0)
    }
}

impl TryFrom<u32> for Kelvin {
    type Error = ValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Color temperature in mireds (`1_000_000 / Kelvin`).
///
/// The conversion is rounded in both directions, so a Kelvin value does not
/// always survive a trip through mireds. Mired values in the usual lighting
/// range (153-500) do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mired(u32);

impl Mired {
    /// Creates a mired value.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::ZeroTemperature` for zero.
    pub fn new(value: u32) -> Result<Self, ValueError> {
        if value == 0 {
            return Err(ValueError::ZeroTemperature);
        }
        Ok(Self(value))
    }

    /// Returns the raw mired value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Converts to Kelvin using `round(1_000_000 / mired)`.
    #[must_use]
    pub fn to_kelvin(&self) -> Kelvin {
        Kelvin(reciprocal_mega(self.0))
    }
}

impl fmt::Display for Mired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mired", self.0)
    }
}

/// The configured span between the warmest and the coolest temperature.
///
/// The warm bound is always strictly below the cool bound, and both lie
/// within [`MIN_KELVIN`](Self::MIN_KELVIN)..=[`MAX_KELVIN`](Self::MAX_KELVIN).
///
/// # Examples
///
/// ```
/// use daylight_sync::types::{Kelvin, SliderPosition, TemperatureRange};
///
/// let range = TemperatureRange::new(Kelvin::new(2700)?, Kelvin::new(6500)?)?;
/// assert_eq!(range.slider_to_kelvin(SliderPosition::MIN).value(), 2700);
/// assert_eq!(range.slider_to_kelvin(SliderPosition::MAX).value(), 6500);
/// # Ok::<(), daylight_sync::error::ValueError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureRange {
    warm: Kelvin,
    cool: Kelvin,
}

impl TemperatureRange {
    /// Lowest accepted bound.
    pub const MIN_KELVIN: u32 = 1000;
    /// Highest accepted bound.
    pub const MAX_KELVIN: u32 = 40_000;

    /// Creates a range from its warm and cool bounds.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if a bound is outside
    /// `MIN_KELVIN..=MAX_KELVIN` and `ValueError::InvertedRange` unless
    /// `warm < cool`.
    pub fn new(warm: Kelvin, cool: Kelvin) -> Result<Self, ValueError> {
        for bound in [warm, cool] {
            if !(Self::MIN_KELVIN..=Self::MAX_KELVIN).contains(&bound.0) {
                return Err(ValueError::OutOfRange {
                    min: Self::MIN_KELVIN,
                    max: Self::MAX_KELVIN,
                    actual: bound.0,
                });
            }
        }
        if warm >= cool {
            return Err(ValueError::InvertedRange {
                warm: warm.value(),
                cool: cool.value(),
            });
        }
        Ok(Self { warm, cool })
    }

    /// Returns the warm bound.
    #[must_use]
    pub const fn warm(&self) -> Kelvin {
        self.warm
    }

    /// Returns the cool bound.
    #[must_use]
    pub const fn cool(&self) -> Kelvin {
        self.cool
    }

    /// Returns the width of the range in Kelvin.
    #[must_use]
    pub const fn span(&self) -> u32 {
        self.cool.0 - self.warm.0
    }

    /// Returns the midpoint, used when the sun position cannot be determined.
    #[must_use]
    pub const fn midpoint(&self) -> Kelvin {
        Kelvin(self.warm.0 + self.span() / 2)
    }

    /// Clamps a temperature into the range.
    #[must_use]
    pub fn clamp(&self, kelvin: Kelvin) -> Kelvin {
        kelvin.clamp(self.warm, self.cool)
    }

    /// Returns true if the temperature lies within the range.
    #[must_use]
    pub fn contains(&self, kelvin: Kelvin) -> bool {
        (self.warm..=self.cool).contains(&kelvin)
    }

    /// Blends between warm (`0.0`) and cool (`1.0`).
    ///
    /// The factor is clamped to `[0, 1]` and the result rounded.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn interpolate(&self, factor: f64) -> Kelvin {
        let factor = if factor.is_nan() {
            0.0
        } else {
            factor.clamp(0.0, 1.0)
        };
        let kelvin = f64::from(self.warm.0) + f64::from(self.span()) * factor;
        // Bounded by cool, which is a u32
        Kelvin(kelvin.round() as u32)
    }

    /// Maps a slider position to Kelvin: `warm + (pct - 1) / 99 * (cool - warm)`.
    #[must_use]
    pub fn slider_to_kelvin(&self, position: SliderPosition) -> Kelvin {
        let fraction = f64::from(position.value() - 1) / 99.0;
        self.interpolate(fraction)
    }

    /// Maps a temperature to the nearest slider position.
    ///
    /// Temperatures outside the range map to the nearest end of the slider.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn kelvin_to_slider(&self, kelvin: Kelvin) -> SliderPosition {
        let kelvin = self.clamp(kelvin);
        let fraction = f64::from(kelvin.0 - self.warm.0) / f64::from(self.span());
        let position = (fraction * 99.0 + 1.0).round();
        // Fraction is in [0, 1], so the position is in [1, 100]
        SliderPosition::clamped(position as u8)
    }
}

impl Default for TemperatureRange {
    fn default() -> Self {
        Self {
            warm: Kelvin(2700),
            cool: Kelvin(6500),
        }
    }
}

impl fmt::Display for TemperatureRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.warm, self.cool)
    }
}
