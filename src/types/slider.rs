// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Slider position type.

use std::fmt;

use crate::error::ValueError;

/// A 1-100% slider position projecting the warm-to-cool range.
///
/// Host platforms without a native color temperature control expose the
/// temperature as a brightness-style slider, where 1% is the warm bound and
/// 100% is the cool bound.
///
/// # Examples
///
/// ```
/// use daylight_sync::types::SliderPosition;
///
/// let pos = SliderPosition::new(50).unwrap();
/// assert_eq!(pos.value(), 50);
///
/// // Zero is not a valid slider position
/// assert!(SliderPosition::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SliderPosition(u8);

impl SliderPosition {
    /// The warm end of the slider (1%).
    pub const MIN: Self = Self(1);

    /// The cool end of the slider (100%).
    pub const MAX: Self = Self(100);

    /// Creates a slider position.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside [1, 100].
    pub fn new(value: u8) -> Result<Self, ValueError> {
        if !(Self::MIN.0..=Self::MAX.0).contains(&value) {
            return Err(ValueError::OutOfRange {
                min: u32::from(Self::MIN.0),
                max: u32::from(Self::MAX.0),
                actual: u32::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Creates a slider position, clamping to the valid range.
    #[must_use]
    pub const fn clamped(value: u8) -> Self {
        if value < Self::MIN.0 {
            Self::MIN
        } else if value > Self::MAX.0 {
            Self::MAX
        } else {
            Self(value)
        }
    }

    /// Returns the percentage value.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for SliderPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<u8> for SliderPosition {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
