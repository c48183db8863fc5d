// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Per-epoch estimation output

use crate::time::GpsTime;

/// Result of one `process_epoch` call
///
/// With `error` set only `log` is meaningful; the remaining fields keep
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Output {
    /// The epoch could not be processed; details are in `log`
    pub error: bool,
    /// Epoch the estimate refers to
    pub epoch_time: Option<GpsTime>,
    /// Rover position, ECEF m
    pub xyz: [f64; 3],
    /// Upper triangle of the 3x3 position covariance, in the order
    /// xx, xy, xz, yy, yz, zz
    pub cov: [f64; 6],
    /// Rover position relative to the a priori position, north/east/up m
    pub neu: [f64; 3],
    /// Number of satellites that contributed to the update
    pub num_sat: usize,
    /// Horizontal dilution of precision
    pub hdop: f64,
    /// A priori tropospheric zenith delay, m
    pub trp0: f64,
    /// Estimated tropospheric zenith wet delay offset, m
    pub trp: f64,
    /// Standard deviation of the troposphere estimate, m
    pub trp_stdev: f64,
    /// Log lines collected while processing the epoch
    pub log: String,
}

/// The one-line epoch summary appended to the log of a successful epoch
#[must_use]
pub(crate) fn epoch_summary(output: &Output) -> String {
    let epoch = match &output.epoch_time {
        Some(t) => t.to_string(),
        None => String::new(),
    };
    format!(
        "{} X = {:.4} Y = {:.4} Z = {:.4} NEU: {:+8.4} {:+8.4} {:+8.4} TRP: {:+8.4} {:+8.4}",
        epoch,
        output.xyz[0],
        output.xyz[1],
        output.xyz[2],
        output.neu[0],
        output.neu[1],
        output.neu[2],
        output.trp0,
        output.trp,
    )
}
