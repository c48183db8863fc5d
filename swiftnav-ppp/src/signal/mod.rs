// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! GNSS satellite and signal identification
//!
//! This module provides:
//! - [`System`] - the supported GNSS constellations
//! - [`Prn`] - a satellite identifier, a constellation plus a satellite number
//! - carrier frequency lookups, including the GLONASS FDMA channel plan
//!
//! Satellites are identified the RINEX way, a system letter followed by a
//! number (`G12`, `R03`, ...). For dense per-satellite tables a [`Prn`] also
//! exposes a compact integer index.
//!
//! # Examples
//!
//! ```rust
//! # use std::str::FromStr;
//! # use swiftnav_ppp::signal::{Prn, System};
//! let prn = Prn::from_str("G12").unwrap();
//! assert_eq!(prn.system(), System::Gps);
//! assert_eq!(prn.number(), 12);
//! assert_eq!(prn.to_string(), "G12");
//! ```

pub mod consts;
mod system;

pub use system::*;

use std::fmt;
use std::str::FromStr;

/// Satellite identifier, a [`System`] plus the satellite number within it
#[derive(
    Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Prn {
    system: System,
    number: u8,
}

/// An error encountered when building a [`Prn`] with a satellite number
/// outside of the range supported by the dense index encoding
#[derive(thiserror::Error, Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
#[error("Invalid satellite number ({0})")]
pub struct InvalidSatNumber(u8);

/// An error encountered when parsing a [`Prn`] from a string
#[derive(thiserror::Error, Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
#[error("Invalid satellite identifier ({0})")]
pub struct InvalidPrnString(pub(crate) char);

impl Prn {
    /// Makes a new satellite identifier, checking the satellite number range
    pub fn new(system: System, number: u8) -> Result<Prn, InvalidSatNumber> {
        if number == 0 || number as usize >= consts::SATS_PER_SYSTEM {
            Err(InvalidSatNumber(number))
        } else {
            Ok(Prn { system, number })
        }
    }

    /// Get the constellation the satellite belongs to
    #[must_use]
    pub fn system(&self) -> System {
        self.system
    }

    /// Get the satellite number within the constellation
    #[must_use]
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Compact index for dense per-satellite arrays
    ///
    /// The encoding is `system * 64 + number`, so every index is below
    /// [`consts::MAX_PRN_INDEX`].
    #[must_use]
    pub fn index(&self) -> usize {
        self.system as usize * consts::SATS_PER_SYSTEM + self.number as usize
    }
}

impl fmt::Display for Prn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", char::from(self.system), self.number)
    }
}

impl FromStr for Prn {
    type Err = InvalidPrnString;

    fn from_str(s: &str) -> Result<Prn, Self::Err> {
        use std::convert::TryFrom;

        let mut chars = s.chars();
        let letter = chars.next().ok_or(InvalidPrnString('?'))?;
        let system = System::try_from(letter).map_err(|_| InvalidPrnString(letter))?;
        let number = chars
            .as_str()
            .parse::<u8>()
            .map_err(|_| InvalidPrnString(letter))?;
        Prn::new(system, number).map_err(|_| InvalidPrnString(letter))
    }
}

/// Carrier frequency in Hz of the given frequency band for a constellation
///
/// `band` is the leading digit of the RINEX observation code ('1', '2', '5'
/// or '7'). GLONASS FDMA bands need the frequency channel number (-7..=6) of
/// the satellite; for the other constellations `slot` is ignored.
///
/// Returns `None` when the constellation does not broadcast on the band.
#[must_use]
pub fn carrier_frequency(system: System, band: char, slot: i16) -> Option<f64> {
    match (system, band) {
        (System::Gps, '1') | (System::Qzs, '1') => Some(consts::GPS_L1_HZ),
        (System::Gps, '2') | (System::Qzs, '2') => Some(consts::GPS_L2_HZ),
        (System::Gps, '5') | (System::Qzs, '5') => Some(consts::GPS_L5_HZ),
        (System::Glo, '1') => Some(consts::GLO_L1_HZ + f64::from(slot) * consts::GLO_L1_STEP_HZ),
        (System::Glo, '2') => Some(consts::GLO_L2_HZ + f64::from(slot) * consts::GLO_L2_STEP_HZ),
        (System::Gal, '1') => Some(consts::GAL_E1_HZ),
        (System::Gal, '5') => Some(consts::GAL_E5A_HZ),
        (System::Gal, '7') => Some(consts::GAL_E5B_HZ),
        (System::Bds, '2') => Some(consts::BDS_B1_HZ),
        (System::Bds, '7') => Some(consts::BDS_B2B_HZ),
        (System::Sbas, '1') => Some(consts::GPS_L1_HZ),
        (System::Sbas, '5') => Some(consts::GPS_L5_HZ),
        _ => None,
    }
}

/// The pair of frequency bands each constellation contributes to the
/// ionosphere-free combination
#[must_use]
pub fn iono_free_bands(system: System) -> Option<(char, char)> {
    match system {
        System::Gps | System::Glo | System::Qzs => Some(('1', '2')),
        System::Gal => Some(('1', '5')),
        System::Bds => Some(('2', '7')),
        System::Sbas => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prn_index_is_dense_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for system in System::iter() {
            for number in 1..consts::SATS_PER_SYSTEM as u8 {
                let prn = Prn::new(system, number).unwrap();
                assert!(prn.index() < consts::MAX_PRN_INDEX);
                assert!(seen.insert(prn.index()));
            }
        }
    }

    #[test]
    fn prn_strings() {
        let prn = Prn::from_str("R07").unwrap();
        assert_eq!(prn.system(), System::Glo);
        assert_eq!(prn.number(), 7);
        assert_eq!(prn.to_string(), "R07");

        assert_eq!(Prn::from_str("C05").unwrap().system(), System::Bds);
        assert!(Prn::from_str("X12").is_err());
        assert!(Prn::from_str("G").is_err());
        assert!(Prn::from_str("G64").is_err());
        assert!(Prn::from_str("G00").is_err());
    }

    #[test]
    fn glonass_channel_plan() {
        // channel 0 is the band center
        assert_eq!(
            carrier_frequency(System::Glo, '1', 0).unwrap(),
            consts::GLO_L1_HZ
        );
        // channel spacing per the GLONASS ICD
        let f_up = carrier_frequency(System::Glo, '1', 3).unwrap();
        assert!((f_up - (consts::GLO_L1_HZ + 3.0 * 562.5e3)).abs() < 1e-3);
        let f_dn = carrier_frequency(System::Glo, '2', -7).unwrap();
        assert!((f_dn - (consts::GLO_L2_HZ - 7.0 * 437.5e3)).abs() < 1e-3);
    }

    #[test]
    fn iono_free_band_pairs() {
        assert_eq!(iono_free_bands(System::Gps), Some(('1', '2')));
        assert_eq!(iono_free_bands(System::Gal), Some(('1', '5')));
        assert_eq!(iono_free_bands(System::Bds), Some(('2', '7')));
        assert_eq!(iono_free_bands(System::Sbas), None);
    }
}
