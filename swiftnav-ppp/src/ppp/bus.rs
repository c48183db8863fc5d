// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Fan-out of ephemerides and corrections to multiple consumers
//!
//! Decoders produce ephemerides and correction records that several PPP
//! clients (one per rover) may want. A [`CorrectionBus`] holds a list of
//! consumer endpoints and forwards every product to each of them; a consumer
//! is anything implementing [`CorrectionSink`], which [`PppClient`] does.
//!
//! [`EpochBuffer`] is the small observation reordering stage in front of a
//! client: it merges observations sharing an epoch time tag, keeps epochs in
//! order and bounds its own size.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::corrections::{ClkCorr, OrbCorr, SatCodeBias, SatPhaseBias, VTec};
use crate::ephemeris::Eph;
use crate::obs::SatObs;
use crate::ppp::client::PppClient;
use crate::time::GpsTime;

/// Epochs buffered at most; beyond this the oldest epoch is dropped
const MAX_BUFFERED_EPOCHS: usize = 120;

/// A consumer of ephemerides and correction products
pub trait CorrectionSink {
    fn put_ephemeris(&mut self, eph: &Eph);
    fn put_orb_corrections(&mut self, corrections: &[OrbCorr]);
    fn put_clk_corrections(&mut self, corrections: &[ClkCorr]);
    fn put_code_biases(&mut self, biases: &[SatCodeBias]);
    fn put_phase_biases(&mut self, biases: &[SatPhaseBias]);
    fn put_tec(&mut self, vtec: &VTec);
}

impl CorrectionSink for PppClient {
    fn put_ephemeris(&mut self, eph: &Eph) {
        PppClient::put_ephemeris(self, eph);
    }
    fn put_orb_corrections(&mut self, corrections: &[OrbCorr]) {
        PppClient::put_orb_corrections(self, corrections);
    }
    fn put_clk_corrections(&mut self, corrections: &[ClkCorr]) {
        PppClient::put_clk_corrections(self, corrections);
    }
    fn put_code_biases(&mut self, biases: &[SatCodeBias]) {
        PppClient::put_code_biases(self, biases);
    }
    fn put_phase_biases(&mut self, biases: &[SatPhaseBias]) {
        PppClient::put_phase_biases(self, biases);
    }
    fn put_tec(&mut self, vtec: &VTec) {
        PppClient::put_tec(self, vtec);
    }
}

/// Shared handle to a correction sink
pub type SinkHandle = Arc<Mutex<dyn CorrectionSink + Send>>;

/// Broadcasts correction products to a list of subscribed sinks
#[derive(Default)]
pub struct CorrectionBus {
    sinks: Vec<SinkHandle>,
}

impl CorrectionBus {
    #[must_use]
    pub fn new() -> CorrectionBus {
        CorrectionBus::default()
    }

    /// Add a consumer; everything published afterwards reaches it
    pub fn subscribe(&mut self, sink: SinkHandle) {
        self.sinks.push(sink);
    }

    /// Number of subscribed consumers
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether any consumer is subscribed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn publish_ephemeris(&self, eph: &Eph) {
        for sink in &self.sinks {
            sink.lock().unwrap().put_ephemeris(eph);
        }
    }

    pub fn publish_orb_corrections(&self, corrections: &[OrbCorr]) {
        for sink in &self.sinks {
            sink.lock().unwrap().put_orb_corrections(corrections);
        }
    }

    pub fn publish_clk_corrections(&self, corrections: &[ClkCorr]) {
        for sink in &self.sinks {
            sink.lock().unwrap().put_clk_corrections(corrections);
        }
    }

    pub fn publish_code_biases(&self, biases: &[SatCodeBias]) {
        for sink in &self.sinks {
            sink.lock().unwrap().put_code_biases(biases);
        }
    }

    pub fn publish_phase_biases(&self, biases: &[SatPhaseBias]) {
        for sink in &self.sinks {
            sink.lock().unwrap().put_phase_biases(biases);
        }
    }

    pub fn publish_tec(&self, vtec: &VTec) {
        for sink in &self.sinks {
            sink.lock().unwrap().put_tec(vtec);
        }
    }
}

/// Reorders and merges incoming observations into whole epochs
///
/// Observations sharing a time tag are merged into one epoch; an
/// observation older than the newest buffered epoch is dropped. The buffer
/// holds a bounded number of epochs and serves them oldest first.
#[derive(Debug, Default)]
pub struct EpochBuffer {
    epochs: VecDeque<(GpsTime, Vec<SatObs>)>,
}

impl EpochBuffer {
    #[must_use]
    pub fn new() -> EpochBuffer {
        EpochBuffer::default()
    }

    /// Number of buffered epochs
    #[must_use]
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Sort an observation into its epoch
    pub fn push(&mut self, obs: SatObs) {
        if let Some((_, sats)) = self.epochs.iter_mut().find(|(t, _)| *t == obs.time) {
            sats.push(obs);
        } else if self.epochs.is_empty() || obs.time > self.epochs.back().unwrap().0 {
            self.epochs.push_back((obs.time, vec![obs]));
        }
        // observations for an epoch older than the newest buffered one are
        // dropped silently, matching the stream semantics of the decoders

        if self.epochs.len() > MAX_BUFFERED_EPOCHS {
            self.epochs.pop_front();
        }
    }

    /// Take the oldest complete epoch off the buffer
    pub fn pop_front(&mut self) -> Option<(GpsTime, Vec<SatObs>)> {
        self.epochs.pop_front()
    }
}
