// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Solar-driven color temperature model.
//!
//! [`SolarTransitionCalculator`] maps an instant to a target color
//! temperature. The sun's altitude is normalized against the altitude it
//! reaches at that day's solar noon, so the coolest point always lands on
//! solar noon regardless of season or latitude. The normalized value is then
//! reshaped by `factor ^ curve_exponent`: exponents above 1 keep the light
//! warm for longer around dawn and dusk.
//!
//! # Degenerate cases
//!
//! When no usable location is configured, or when the sun never rises on the
//! current day (polar night), the calculator returns the midpoint of the
//! configured range and logs a warning. This is a deliberate, observable
//! fallback rather than an approximation of the sun's position.

mod astronomy;

pub use astronomy::{AstronomyProvider, NoaaAstronomy};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::ValueError;
use crate::types::{Kelvin, TemperatureRange};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Immutable parameters of the solar model.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use daylight_sync::solar::SolarConfig;
/// use daylight_sync::types::TemperatureRange;
///
/// let config = SolarConfig::new(52.52, 13.405, TemperatureRange::default(), 3.0)?
///     .with_update_interval(Duration::from_secs(60))?;
/// assert!(config.location().is_some());
/// # Ok::<(), daylight_sync::error::ValueError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SolarConfig {
    latitude: f64,
    longitude: f64,
    range: TemperatureRange,
    curve_exponent: f64,
    update_interval: Duration,
}

impl SolarConfig {
    /// Default curve exponent.
    pub const DEFAULT_CURVE_EXPONENT: f64 = 3.0;

    /// Default interval between automatic recomputations.
    pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(300);

    /// Creates a solar configuration.
    ///
    /// A latitude or longitude of exactly zero is treated as "not set".
    ///
    /// # Errors
    ///
    /// Returns `ValueError::NotPositive` if the curve exponent is not a
    /// finite positive number.
    pub fn new(
        latitude: f64,
        longitude: f64,
        range: TemperatureRange,
        curve_exponent: f64,
    ) -> Result<Self, ValueError> {
        if !(curve_exponent.is_finite() && curve_exponent > 0.0) {
            return Err(ValueError::NotPositive {
                name: "curve exponent",
                value: curve_exponent,
            });
        }
        Ok(Self {
            latitude,
            longitude,
            range,
            curve_exponent,
            update_interval: Self::DEFAULT_UPDATE_INTERVAL,
        })
    }

    /// Sets the interval between automatic recomputations.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::NotPositive` for a zero interval.
    pub fn with_update_interval(mut self, interval: Duration) -> Result<Self, ValueError> {
        if interval.is_zero() {
            return Err(ValueError::NotPositive {
                name: "update interval",
                value: 0.0,
            });
        }
        self.update_interval = interval;
        Ok(self)
    }

    /// Returns `(latitude, longitude)` if both are set and finite.
    #[must_use]
    pub fn location(&self) -> Option<(f64, f64)> {
        let usable = |v: f64| v.is_finite() && v != 0.0;
        (usable(self.latitude) && usable(self.longitude)).then_some((self.latitude, self.longitude))
    }

    /// Returns the configured temperature range.
    #[must_use]
    pub fn range(&self) -> TemperatureRange {
        self.range
    }

    /// Returns the curve exponent.
    #[must_use]
    pub fn curve_exponent(&self) -> f64 {
        self.curve_exponent
    }

    /// Returns the interval between automatic recomputations.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }
}

/// How a transition factor was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Derived from the sun's position; the value is in `[0, 1]`.
    Solar(f64),
    /// No location is configured.
    NoLocation,
    /// The sun stays below the horizon all day.
    PolarNight,
}

impl Transition {
    /// Returns the blend factor, `0.5` for the degenerate cases.
    #[must_use]
    pub fn factor(&self) -> f64 {
        match self {
            Self::Solar(factor) => *factor,
            Self::NoLocation | Self::PolarNight => 0.5,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solar(factor) => write!(f, "solar factor {factor:.3}"),
            Self::NoLocation => f.write_str("no location configured"),
            Self::PolarNight => f.write_str("sun does not rise today"),
        }
    }
}

/// Maps time and location to a target color temperature.
#[derive(Clone)]
pub struct SolarTransitionCalculator {
    config: SolarConfig,
    astronomy: Arc<dyn AstronomyProvider>,
}

impl fmt::Debug for SolarTransitionCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolarTransitionCalculator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SolarTransitionCalculator {
    /// Creates a calculator backed by [`NoaaAstronomy`].
    #[must_use]
    pub fn new(config: SolarConfig) -> Self {
        Self::with_astronomy(config, Arc::new(NoaaAstronomy))
    }

    /// Creates a calculator with a custom astronomy provider.
    #[must_use]
    pub fn with_astronomy(config: SolarConfig, astronomy: Arc<dyn AstronomyProvider>) -> Self {
        if config.location().is_none() {
            tracing::warn!(
                latitude = config.latitude,
                longitude = config.longitude,
                "No usable location configured, solar transition falls back to the range midpoint"
            );
        }
        Self { config, astronomy }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SolarConfig {
        &self.config
    }

    /// Computes how far the day has progressed from warm to cool.
    #[must_use]
    pub fn transition(&self, now: DateTime<Utc>) -> Transition {
        let Some((latitude, longitude)) = self.config.location() else {
            return Transition::NoLocation;
        };

        let altitude = self.astronomy.solar_altitude(now, latitude, longitude);

        // The solar day changes at local solar midnight, not at UTC midnight
        #[allow(clippy::cast_possible_truncation)]
        let solar_offset = TimeDelta::seconds((longitude / 15.0 * 3600.0).round() as i64);
        let solar_date = (now + solar_offset).date_naive();
        let noon = self.astronomy.solar_noon(solar_date, latitude, longitude);
        let max_altitude = self.astronomy.solar_altitude(noon, latitude, longitude);

        tracing::debug!(
            altitude = altitude.to_degrees(),
            max_altitude = max_altitude.to_degrees(),
            noon = %noon,
            "Computed sun position"
        );

        if max_altitude <= 0.0 {
            return Transition::PolarNight;
        }
        if altitude <= 0.0 {
            return Transition::Solar(0.0);
        }

        let normalized = (altitude / max_altitude).clamp(0.0, 1.0);
        Transition::Solar(normalized.powf(self.config.curve_exponent))
    }

    /// Returns the ideal color temperature at `now`.
    #[must_use]
    pub fn ideal_temperature(&self, now: DateTime<Utc>) -> Kelvin {
        let range = self.config.range;
        match self.transition(now) {
            Transition::Solar(factor) => range.interpolate(factor),
            degenerate => {
                tracing::warn!(reason = %degenerate, "Using range midpoint as ideal temperature");
                range.midpoint()
            }
        }
    }
}
