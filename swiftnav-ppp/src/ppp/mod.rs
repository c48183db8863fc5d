// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Precise Point Positioning
//!
//! The per-rover estimation pipeline: a [`PppClient`] conditions raw
//! observations, resolves satellite states through the shared ephemeris
//! store, and runs the sequential Kalman filter ([`filter`]) to produce an
//! [`Output`] per epoch. [`bus`] provides the fan-out of ephemerides and
//! corrections to several clients, and the epoch reordering buffer.

pub mod bus;
pub mod client;
pub mod filter;
pub mod options;
pub mod output;

pub use bus::{CorrectionBus, CorrectionSink, EpochBuffer};
pub use client::PppClient;
pub use filter::{FilterError, PppFilter};
pub use options::{LinearCombination, PppOptions};
pub use output::Output;
