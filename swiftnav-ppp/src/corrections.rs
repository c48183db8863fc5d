// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! State Space Representation (SSR) correction records
//!
//! These are the value types the engine consumes from a correction stream:
//! orbit and clock corrections to a specific broadcast ephemeris (matched by
//! issue-of-data), satellite code and phase biases, and a vertical TEC model.
//! They are plain data, copied into the engine on every `put_*` call; the
//! caller keeps ownership of its lists.

use crate::signal::Prn;
use crate::time::GpsTime;

/// SSR orbit correction in the orbit-local radial/along-track/cross-track
/// frame, valid at a reference epoch with linear rates
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrbCorr {
    /// Satellite the correction applies to
    pub prn: Prn,
    /// Issue-of-data of the broadcast ephemeris this correction refers to
    pub iod: u32,
    /// Reference epoch of the correction
    pub time: GpsTime,
    /// Radial, along-track, cross-track position deltas, m
    pub rac: [f64; 3],
    /// Radial, along-track, cross-track velocity deltas, m/s
    pub dot_rac: [f64; 3],
}

/// SSR clock correction polynomial, valid at a reference epoch
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClkCorr {
    /// Satellite the correction applies to
    pub prn: Prn,
    /// Issue-of-data of the broadcast ephemeris this correction refers to
    pub iod: u32,
    /// Reference epoch of the correction
    pub time: GpsTime,
    /// Polynomial coefficients, m, m/s, m/s^2
    pub dclk: [f64; 3],
}

impl ClkCorr {
    /// Evaluate the correction polynomial at `t`, in meters
    #[must_use]
    pub fn value_at(&self, t: &GpsTime) -> f64 {
        let dt = t.diff(&self.time);
        self.dclk[0] + self.dclk[1] * dt + self.dclk[2] * dt * dt
    }
}

/// A single code bias: the two character RINEX observation code it applies
/// to ("1C", "2W", ...) and the bias value in meters
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CodeBias {
    /// RINEX observation code, band digit plus tracking attribute
    pub channel: String,
    /// Bias value, m
    pub value: f64,
}

/// The set of code biases broadcast for one satellite
///
/// A newer message for the same satellite replaces the whole set.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SatCodeBias {
    /// Satellite the biases apply to
    pub prn: Prn,
    /// Reference epoch of the message
    pub time: GpsTime,
    /// Per-signal biases
    pub biases: Vec<CodeBias>,
}

impl SatCodeBias {
    /// Look up the bias for an observation's RINEX code, if one was broadcast
    #[must_use]
    pub fn bias_for(&self, channel: &str) -> Option<f64> {
        self.biases
            .iter()
            .find(|b| b.channel == channel)
            .map(|b| b.value)
    }
}

/// The set of phase biases broadcast for one satellite
///
/// Accepted by the engine but not used by the current filter; kept so a
/// correction stream can be wired through unchanged.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SatPhaseBias {
    /// Satellite the biases apply to
    pub prn: Prn,
    /// Reference epoch of the message
    pub time: GpsTime,
    /// Per-signal biases, m
    pub biases: Vec<CodeBias>,
}

/// One layer of a vertical TEC model
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VTecLayer {
    /// Layer height, m
    pub height: f64,
    /// Spherical harmonic coefficients, cosine terms
    pub c: Vec<Vec<f64>>,
    /// Spherical harmonic coefficients, sine terms
    pub s: Vec<Vec<f64>>,
}

/// Vertical TEC model from a correction stream
///
/// Accepted by the engine but not used by the current filter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VTec {
    /// Reference epoch of the model
    pub time: GpsTime,
    /// Ionospheric layers
    pub layers: Vec<VTecLayer>,
}
