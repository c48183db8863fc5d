// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Signal related constants

/// Speed of light, m/s (IAU 1976)
pub const C_LIGHT: f64 = 299_792_458.0;

/// Satellite numbers per constellation reserved by the dense PRN index
pub const SATS_PER_SYSTEM: usize = 64;

/// Upper bound (exclusive) of [`crate::signal::Prn::index`]
pub const MAX_PRN_INDEX: usize = 6 * SATS_PER_SYSTEM;

/// GPS L1 carrier frequency, Hz (10.23 MHz * 154)
pub const GPS_L1_HZ: f64 = 1.575_42e9;
/// GPS L2 carrier frequency, Hz (10.23 MHz * 120)
pub const GPS_L2_HZ: f64 = 1.227_60e9;
/// GPS L5 carrier frequency, Hz (10.23 MHz * 115)
pub const GPS_L5_HZ: f64 = 1.176_45e9;

/// GLONASS L1 band center frequency, Hz
pub const GLO_L1_HZ: f64 = 1.602e9;
/// GLONASS L1 FDMA channel spacing, Hz
pub const GLO_L1_STEP_HZ: f64 = 562.5e3;
/// GLONASS L2 band center frequency, Hz
pub const GLO_L2_HZ: f64 = 1.246e9;
/// GLONASS L2 FDMA channel spacing, Hz
pub const GLO_L2_STEP_HZ: f64 = 437.5e3;

/// Galileo E1 carrier frequency, Hz
pub const GAL_E1_HZ: f64 = 1.575_42e9;
/// Galileo E5a carrier frequency, Hz
pub const GAL_E5A_HZ: f64 = 1.176_45e9;
/// Galileo E5b carrier frequency, Hz
pub const GAL_E5B_HZ: f64 = 1.207_14e9;

/// BeiDou B1-2 carrier frequency, Hz
pub const BDS_B1_HZ: f64 = 1.561_098e9;
/// BeiDou B2b carrier frequency, Hz
pub const BDS_B2B_HZ: f64 = 1.207_14e9;

/// GPS L1 wavelength, m
pub const GPS_L1_WAVELENGTH: f64 = C_LIGHT / GPS_L1_HZ;
/// GPS L2 wavelength, m
pub const GPS_L2_WAVELENGTH: f64 = C_LIGHT / GPS_L2_HZ;
