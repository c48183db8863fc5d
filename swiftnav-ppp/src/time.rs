// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! GPS time representation
//!
//! The engine keeps all epochs in GPS time, expressed as a week number and
//! seconds into the week. Conversions to other time bases are the host
//! application's business; the only arithmetic the estimation pipeline needs
//! is differencing, shifting and week-boundary normalization.

use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of seconds in a GPS week
pub const WEEK_SECS: u32 = 604_800;

/// Number of seconds in an hour, used when resolving the truncated RTCM2
/// hour-of-week epoch field
pub const HOUR_SECS: u32 = 3600;

/// Error type when a given GPS time is not valid
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, thiserror::Error)]
pub enum InvalidGpsTime {
    /// Indicates an invalid week number was given, with the invalid value returned
    #[error("Invalid Week Number: {0}")]
    InvalidWn(i16),
    /// Indicates an invalid time of week was given, with the invalid value returned
    #[error("Invalid Time of Week: {0}")]
    InvalidTow(f64),
}

/// Representation of GPS Time
#[derive(Debug, Copy, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct GpsTime {
    /// GPS week number
    wn: i16,
    /// Seconds since the GPS start of week
    tow: f64,
}

impl GpsTime {
    /// Makes a new GPS time object and checks the validity of the given values.
    ///
    /// # Errors
    ///
    /// An error will be returned if an invalid time is given. A valid time
    /// must have a non-negative week number, and a time of week value between
    /// 0 and 604800.
    pub fn new(wn: i16, tow: f64) -> Result<GpsTime, InvalidGpsTime> {
        if wn < 0 {
            Err(InvalidGpsTime::InvalidWn(wn))
        } else if !tow.is_finite() || tow < 0.0 || tow >= f64::from(WEEK_SECS) {
            Err(InvalidGpsTime::InvalidTow(tow))
        } else {
            Ok(GpsTime { wn, tow })
        }
    }

    /// Makes a new GPS time object without checking the validity of the given
    /// values
    pub(crate) const fn new_unchecked(wn: i16, tow: f64) -> GpsTime {
        GpsTime { wn, tow }
    }

    /// Gets the week number
    #[must_use]
    pub fn wn(&self) -> i16 {
        self.wn
    }

    /// Gets the time of week
    #[must_use]
    pub fn tow(&self) -> f64 {
        self.tow
    }

    /// Checks if the stored time is valid
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.tow.is_finite() && self.tow >= 0.0 && self.tow < f64::from(WEEK_SECS) && self.wn >= 0
    }

    /// Seconds into the current hour, the time tag resolution used by the
    /// legacy differential observation messages
    #[must_use]
    pub fn hour_secs(&self) -> f64 {
        self.tow % f64::from(HOUR_SECS)
    }

    /// Normalize time of week value so it's within the length of a week
    fn normalize(&mut self) {
        while self.tow < 0.0 {
            self.tow += f64::from(WEEK_SECS);
            self.wn -= 1;
        }

        while self.tow >= f64::from(WEEK_SECS) {
            self.tow -= f64::from(WEEK_SECS);
            self.wn += 1;
        }
    }

    /// Gets the difference between this and another time value in seconds
    #[must_use]
    pub fn diff(&self, other: &Self) -> f64 {
        let dt = self.tow - other.tow;
        dt + f64::from(self.wn - other.wn) * f64::from(WEEK_SECS)
    }
}

impl Add<f64> for GpsTime {
    type Output = GpsTime;
    fn add(mut self, rhs: f64) -> GpsTime {
        self.tow += rhs;
        self.normalize();
        self
    }
}

impl AddAssign<f64> for GpsTime {
    fn add_assign(&mut self, rhs: f64) {
        self.tow += rhs;
        self.normalize();
    }
}

impl Sub<f64> for GpsTime {
    type Output = GpsTime;
    fn sub(mut self, rhs: f64) -> GpsTime {
        self.tow -= rhs;
        self.normalize();
        self
    }
}

impl SubAssign<f64> for GpsTime {
    fn sub_assign(&mut self, rhs: f64) {
        self.tow -= rhs;
        self.normalize();
    }
}

impl PartialEq for GpsTime {
    fn eq(&self, other: &Self) -> bool {
        self.diff(other).abs() < 1e-9
    }
}

impl PartialOrd for GpsTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.diff(other).partial_cmp(&0.0)
    }
}

impl std::fmt::Display for GpsTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:09.2}", self.wn, self.tow)
    }
}
