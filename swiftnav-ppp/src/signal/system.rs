// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.

/// GNSS satellite constellations
#[derive(
    Debug,
    Copy,
    Clone,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::AsRefStr,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::FromRepr,
    strum::IntoStaticStr,
)]
#[repr(u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum System {
    /// GPS
    Gps,
    /// GLONASS
    Glo,
    /// Galileo
    Gal,
    /// Beidou
    Bds,
    /// QZSS
    Qzs,
    /// SBAS - Space based augmentation systems
    Sbas,
}

impl System {
    /// Get an iterator through the constellations
    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }
}

/// An error encountered when converting a character into a [`System`]
/// and no constellation is associated with the given value
#[derive(thiserror::Error, Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
#[error("Invalid character for GNSS system ({0})")]
pub struct InvalidSystemChar(char);

/// The character abbreviations used follow the RINEX conventions
impl std::convert::From<System> for char {
    fn from(s: System) -> char {
        match s {
            System::Gps => 'G',
            System::Glo => 'R',
            System::Gal => 'E',
            System::Bds => 'C',
            System::Qzs => 'J',
            System::Sbas => 'S',
        }
    }
}

/// The character abbreviations used follow the RINEX conventions
impl std::convert::TryFrom<char> for System {
    type Error = InvalidSystemChar;

    fn try_from(c: char) -> Result<System, Self::Error> {
        match c {
            'G' => Ok(System::Gps),
            'R' => Ok(System::Glo),
            'E' => Ok(System::Gal),
            'C' => Ok(System::Bds),
            'J' => Ok(System::Qzs),
            'S' => Ok(System::Sbas),
            _ => Err(InvalidSystemChar(c)),
        }
    }
}
