// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Troposphere delay model
//!
//! Saastamoinen model on a standard atmosphere: pressure and temperature are
//! derived from the receiver height, humidity is fixed at 50%. The filter
//! uses this as the a priori delay and estimates a residual zenith wet delay
//! on top, mapped with 1/sin(elevation).

/// A priori tropospheric delay at `elevation` (rad) for a receiver at
/// `height` (m above the ellipsoid), meters
#[must_use]
pub fn saastamoinen_delay(height: f64, elevation: f64) -> f64 {
    // standard atmosphere at receiver height
    let pressure = 1013.25 * (1.0 - 2.26e-5 * height).powf(5.225);
    let temperature = 18.0 - height * 0.0065 + 273.15;
    let humidity = 50.0;
    let e = humidity / 100.0
        * (-37.2465 + 0.213_166 * temperature - 0.000_256_908 * temperature * temperature).exp();

    0.002_277 / elevation.sin() * (pressure + (1255.0 / temperature + 0.05) * e)
}

/// Mapping from the zenith wet delay to `elevation` (rad)
#[must_use]
pub fn wet_mapping(elevation: f64) -> f64 {
    1.0 / elevation.sin()
}
