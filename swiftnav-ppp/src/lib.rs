// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! `swiftnav-ppp` is a real-time Precise Point Positioning engine for
//! multi-constellation GNSS (GPS, GLONASS, Galileo, BeiDou). It ingests raw
//! satellite observations from a rover receiver together with broadcast
//! ephemerides and SSR correction streams, and produces epoch-by-epoch
//! rover positions in Earth-Centered Earth-Fixed coordinates along with a
//! tropospheric zenith delay estimate.
//!
//! The crate covers the estimation core and the legacy RTCM2 ingress path;
//! transports (NTRIP), file readers/writers and user interfaces are the
//! host application's business.
//!
//! ## [PPP](`ppp`)
//! The per-rover pipeline: observation conditioning with the
//! constellation's ionosphere-free combination, the transmission time
//! solver, and the sequential Kalman filter over position, receiver clock,
//! troposphere and float ambiguities. One [`ppp::PppClient`] per rover.
//!
//! ## [Ephemerides](`ephemeris`)
//! Broadcast ephemerides for all supported constellations with plausibility
//! checking, a shared bounded per-satellite store, and SSR orbit/clock
//! correction attachment by issue-of-data.
//!
//! ## [RTCM2](`rtcm2`)
//! The legacy 30-bit-word differential wire format: parity-checked word
//! extraction, packet framing, and decoding of the observation and station
//! message types.
//!
//! ## [Signals](`signal`), [Time](`time`), [Coordinates](`coords`)
//! Satellite identifiers and carrier frequencies (including the GLONASS
//! FDMA channel plan), GPS time arithmetic, and the coordinate conversions
//! the estimation needs.
//!
//! # Example
//!
//! ```rust
//! use swiftnav_ppp::ppp::{PppClient, PppOptions};
//!
//! let mut client = PppClient::new(PppOptions::default());
//! // feed ephemerides and corrections as they arrive ...
//! let output = client.process_epoch(&[]);
//! // ... no observations yet, so the epoch reports an error
//! assert!(output.error);
//! ```

pub mod coords;
pub mod corrections;
pub mod ephemeris;
pub mod obs;
pub mod ppp;
pub mod rtcm2;
pub mod signal;
pub mod time;
pub mod trop;
