// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sun position providers.
//!
//! The transition calculator only needs two answers from astronomy: how high
//! the sun is at a given instant, and when it culminates on a given day.
//! [`NoaaAstronomy`] answers both with the NOAA solar position equations,
//! which are accurate to well under a degree between latitudes ±72°.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};

/// Source of solar geometry.
pub trait AstronomyProvider: Send + Sync {
    /// Returns the sun's altitude above the horizon in radians.
    ///
    /// Negative values mean the sun is below the horizon.
    fn solar_altitude(&self, time: DateTime<Utc>, latitude: f64, longitude: f64) -> f64;

    /// Returns the instant of maximum solar altitude on the given date.
    ///
    /// The date is a local solar date for the given longitude.
    fn solar_noon(&self, date: NaiveDate, latitude: f64, longitude: f64) -> DateTime<Utc>;
}

/// Sun position from the NOAA solar calculator equations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoaaAstronomy;

/// Declination (radians) and equation of time (minutes) at an instant.
#[derive(Debug, Clone, Copy)]
struct SolarTerms {
    declination: f64,
    equation_of_time: f64,
}

/// Julian date of the Unix epoch.
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Julian date of J2000.0.
const J2000_JD: f64 = 2_451_545.0;

#[allow(clippy::cast_precision_loss)]
fn julian_century(time: DateTime<Utc>) -> f64 {
    let seconds = time.timestamp() as f64 + f64::from(time.timestamp_subsec_millis()) / 1000.0;
    let julian_day = seconds / 86_400.0 + UNIX_EPOCH_JD;
    (julian_day - J2000_JD) / 36_525.0
}

fn solar_terms(time: DateTime<Utc>) -> SolarTerms {
    let t = julian_century(time);

    let mean_longitude = (280.466_46 + t * (36_000.769_83 + t * 0.000_303_2)).rem_euclid(360.0);
    let mean_anomaly = 357.529_11 + t * (35_999.050_29 - 0.000_153_7 * t);
    let eccentricity = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

    let m = mean_anomaly.to_radians();
    let center = m.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
        + (2.0 * m).sin() * (0.019_993 - 0.000_101 * t)
        + (3.0 * m).sin() * 0.000_289;

    let true_longitude = mean_longitude + center;
    let omega = (125.04 - 1_934.136 * t).to_radians();
    let apparent_longitude = (true_longitude - 0.005_69 - 0.004_78 * omega.sin()).to_radians();

    let mean_obliquity =
        23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.000_59 - t * 0.001_813))) / 60.0) / 60.0;
    let obliquity = (mean_obliquity + 0.002_56 * omega.cos()).to_radians();

    let declination = (obliquity.sin() * apparent_longitude.sin()).asin();

    let y = (obliquity / 2.0).tan().powi(2);
    let l0 = mean_longitude.to_radians();
    let equation_of_time = 4.0
        * (y * (2.0 * l0).sin() - 2.0 * eccentricity * m.sin()
            + 4.0 * eccentricity * y * m.sin() * (2.0 * l0).cos()
            - 0.5 * y * y * (4.0 * l0).sin()
            - 1.25 * eccentricity * eccentricity * (2.0 * m).sin())
        .to_degrees();

    SolarTerms {
        declination,
        equation_of_time,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn minutes_after(date: NaiveDate, minutes: f64) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN).and_utc();
    // Sub-minute precision is plenty for noon; bounded by a few days either way
    midnight + TimeDelta::milliseconds((minutes * 60_000.0).round() as i64)
}

impl AstronomyProvider for NoaaAstronomy {
    fn solar_altitude(&self, time: DateTime<Utc>, latitude: f64, longitude: f64) -> f64 {
        let terms = solar_terms(time);

        let minutes_of_day = f64::from(time.num_seconds_from_midnight()) / 60.0;
        let true_solar_time =
            (minutes_of_day + terms.equation_of_time + 4.0 * longitude).rem_euclid(1_440.0);
        let hour_angle = (true_solar_time / 4.0 - 180.0).to_radians();

        let lat = latitude.to_radians();
        let cos_zenith = (lat.sin() * terms.declination.sin()
            + lat.cos() * terms.declination.cos() * hour_angle.cos())
        .clamp(-1.0, 1.0);

        std::f64::consts::FRAC_PI_2 - cos_zenith.acos()
    }

    fn solar_noon(&self, date: NaiveDate, _latitude: f64, longitude: f64) -> DateTime<Utc> {
        // First guess ignores the equation of time, second pass refines it
        let approximate = minutes_after(date, 720.0 - 4.0 * longitude);
        let terms = solar_terms(approximate);
        minutes_after(date, 720.0 - 4.0 * longitude - terms.equation_of_time)
    }
}
