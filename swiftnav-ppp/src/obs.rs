// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Observation records
//!
//! [`SatObs`] is the ingress type: per satellite and epoch, a list of
//! per-signal measurements keyed by their RINEX observation code, with code
//! in meters and carrier phase in cycles as it comes off the wire.
//!
//! [`SatData`] is the conditioned per-satellite record the filter works on.
//! Carrier phases are converted to meters on the way in and the
//! constellation's dual-frequency ionosphere-free combination is formed;
//! everything downstream of this module deals in meters only.

use nalgebra::Vector3;

use crate::coords::AzimuthElevation;
use crate::signal::consts::C_LIGHT;
use crate::signal::{carrier_frequency, iono_free_bands, Prn, System};
use crate::time::GpsTime;

/// One signal's worth of measurements for a satellite at one epoch
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrqObs {
    /// RINEX observation code, band digit plus tracking attribute ("1C",
    /// "2W", ...)
    pub channel: String,
    /// Code pseudorange, m
    pub code: f64,
    /// Carrier phase, cycles
    pub phase: f64,
    /// Loss-of-lock flagged by the receiver
    pub slip: bool,
    /// Receiver slip counter, -1 when not provided
    pub slip_counter: i32,
    pub code_valid: bool,
    pub phase_valid: bool,
}

impl FrqObs {
    /// An empty measurement for the given observation code
    #[must_use]
    pub fn new(channel: &str) -> FrqObs {
        FrqObs {
            channel: channel.to_string(),
            code: 0.0,
            phase: 0.0,
            slip: false,
            slip_counter: -1,
            code_valid: false,
            phase_valid: false,
        }
    }
}

/// All measurements of one satellite at one epoch, as delivered by a decoder
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SatObs {
    pub prn: Prn,
    pub time: GpsTime,
    pub obs: Vec<FrqObs>,
}

/// Conditioned observation of one satellite, ready for the filter
///
/// Code and phase are per-frequency-band in meters; the ionosphere-free
/// combination and its coefficients are filled by [`SatData::form_iono_free`],
/// the satellite state by the transmission time solver, and elevation and
/// azimuth once the rover position is known.
#[derive(Debug, Clone, PartialEq)]
pub struct SatData {
    pub prn: Prn,
    pub time: GpsTime,
    /// Code pseudoranges per band, m, zero when absent
    pub p1: f64,
    pub p2: f64,
    pub p5: f64,
    pub p7: f64,
    /// Carrier phases per band; cycles at ingress, meters once conditioned
    pub l1: f64,
    pub l2: f64,
    pub l5: f64,
    pub l7: f64,
    /// Any signal of this satellite flagged a slip this epoch
    pub slip_flag: bool,
    /// Ionosphere-free code combination, m
    pub p3: f64,
    /// Ionosphere-free phase combination, m
    pub l3: f64,
    /// Effective wavelength of the combination, m
    pub lambda3: f64,
    /// Combination coefficients
    pub lk_a: f64,
    pub lk_b: f64,
    /// Satellite state at transmission time
    pub sat_pos: Vector3<f64>,
    pub sat_vel: Vector3<f64>,
    /// Satellite clock offset scaled to meters
    pub sat_clock_m: f64,
    /// Direction from the rover, filled during the filter update
    pub azel: AzimuthElevation,
}

impl SatData {
    /// Collect the per-band measurements of `obs`, applying `code_bias`
    /// (meters, matched by the observation code) to the pseudoranges
    ///
    /// Only the bias whose two-character code equals the observation's
    /// channel string is applied, mirroring how the biases are broadcast.
    #[must_use]
    pub fn from_obs(obs: &SatObs, code_bias: impl Fn(&str) -> Option<f64>) -> SatData {
        let mut sd = SatData {
            prn: obs.prn,
            time: obs.time,
            p1: 0.0,
            p2: 0.0,
            p5: 0.0,
            p7: 0.0,
            l1: 0.0,
            l2: 0.0,
            l5: 0.0,
            l7: 0.0,
            slip_flag: false,
            p3: 0.0,
            l3: 0.0,
            lambda3: 0.0,
            lk_a: 0.0,
            lk_b: 0.0,
            sat_pos: Vector3::zeros(),
            sat_vel: Vector3::zeros(),
            sat_clock_m: 0.0,
            azel: AzimuthElevation::default(),
        };

        for frq in &obs.obs {
            let cb = code_bias(&frq.channel).unwrap_or(0.0);
            let (p, l) = match frq.channel.chars().next() {
                Some('1') => (&mut sd.p1, &mut sd.l1),
                Some('2') => (&mut sd.p2, &mut sd.l2),
                Some('5') => (&mut sd.p5, &mut sd.l5),
                Some('7') => (&mut sd.p7, &mut sd.l7),
                _ => continue,
            };
            if frq.code_valid {
                *p = frq.code + cb;
            }
            if frq.phase_valid {
                *l = frq.phase;
            }
            if frq.slip {
                sd.slip_flag = true;
            }
        }

        sd
    }

    /// Form the constellation's dual-frequency ionosphere-free combination
    ///
    /// Converts the carrier phases of the combination's two bands from
    /// cycles to meters, then fills `p3`, `l3`, `lambda3` and the
    /// coefficients. GLONASS needs the satellite's frequency channel number.
    ///
    /// Returns `false` (and leaves the combination empty) when either band
    /// misses code or phase, or the constellation has no combination
    /// defined.
    pub fn form_iono_free(&mut self, glo_slot: Option<i16>) -> bool {
        let system = self.prn.system();
        let (band_a, band_b) = match iono_free_bands(system) {
            Some(bands) => bands,
            None => return false,
        };
        let slot = match (system, glo_slot) {
            (System::Glo, Some(slot)) => slot,
            (System::Glo, None) => return false,
            _ => 0,
        };

        let f1 = match carrier_frequency(system, band_a, slot) {
            Some(f) => f,
            None => return false,
        };
        let f2 = match carrier_frequency(system, band_b, slot) {
            Some(f) => f,
            None => return false,
        };

        let (pa, la) = self.band(band_a);
        let (pb, lb) = self.band(band_b);
        if pa == 0.0 || pb == 0.0 || la == 0.0 || lb == 0.0 {
            return false;
        }

        let a1 = f1 * f1 / (f1 * f1 - f2 * f2);
        let a2 = -f2 * f2 / (f1 * f1 - f2 * f2);

        let la_m = la * C_LIGHT / f1;
        let lb_m = lb * C_LIGHT / f2;
        self.set_band_phase(band_a, la_m);
        self.set_band_phase(band_b, lb_m);

        self.p3 = a1 * pa + a2 * pb;
        self.l3 = a1 * la_m + a2 * lb_m;
        self.lambda3 = a1 * C_LIGHT / f1 + a2 * C_LIGHT / f2;
        self.lk_a = a1;
        self.lk_b = a2;
        true
    }

    fn band(&self, band: char) -> (f64, f64) {
        match band {
            '1' => (self.p1, self.l1),
            '2' => (self.p2, self.l2),
            '5' => (self.p5, self.l5),
            '7' => (self.p7, self.l7),
            _ => (0.0, 0.0),
        }
    }

    fn set_band_phase(&mut self, band: char, value: f64) {
        match band {
            '1' => self.l1 = value,
            '2' => self.l2 = value,
            '5' => self.l5 = value,
            '7' => self.l7 = value,
            _ => {}
        }
    }
}

/// The set of conditioned observations sharing one epoch time tag
#[derive(Debug, Clone, Default)]
pub struct EpochData {
    /// Common epoch of the contained observations
    pub time: Option<GpsTime>,
    /// Conditioned observations by satellite
    pub sats: std::collections::BTreeMap<Prn, SatData>,
}

impl EpochData {
    pub fn clear(&mut self) {
        self.time = None;
        self.sats.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    fn gps_obs(prn: u8, p1: f64, p2: f64, l1_cycles: f64, l2_cycles: f64) -> SatObs {
        let mut o1 = FrqObs::new("1W");
        o1.code = p1;
        o1.code_valid = true;
        o1.phase = l1_cycles;
        o1.phase_valid = true;
        let mut o2 = FrqObs::new("2W");
        o2.code = p2;
        o2.code_valid = true;
        o2.phase = l2_cycles;
        o2.phase_valid = true;
        SatObs {
            prn: Prn::new(System::Gps, prn).unwrap(),
            time: GpsTime::new(2100, 0.0).unwrap(),
            obs: vec![o1, o2],
        }
    }

    #[test]
    fn iono_free_coefficients_cancel_first_order_delay() {
        let obs = gps_obs(12, 2.1e7, 2.1e7, 1.0e8, 0.9e8);
        let mut sd = SatData::from_obs(&obs, |_| None);
        assert!(sd.form_iono_free(None));

        let f1 = carrier_frequency(System::Gps, '1', 0).unwrap();
        let f2 = carrier_frequency(System::Gps, '2', 0).unwrap();
        // a dispersive 1/f^2 term cancels: a/f1^2 + b/f2^2 = 0 within rounding
        assert_float_eq!(
            sd.lk_a / (f1 * f1) + sd.lk_b / (f2 * f2),
            0.0,
            abs <= 1e-24
        );
        // coefficients sum to one, so an identical input is recovered
        assert_float_eq!(sd.lk_a + sd.lk_b, 1.0, abs <= 1e-12);
        assert_float_eq!(sd.p3, 2.1e7, abs <= 1e-6);
    }

    #[test]
    fn iono_free_removes_synthetic_ionosphere() {
        // geometric range plus a dispersive delay scaling with 1/f^2
        let rho = 2.15e7;
        let iono_l1 = 4.0;
        let f1 = carrier_frequency(System::Gps, '1', 0).unwrap();
        let f2 = carrier_frequency(System::Gps, '2', 0).unwrap();
        let iono_l2 = iono_l1 * (f1 * f1) / (f2 * f2);

        let obs = gps_obs(12, rho + iono_l1, rho + iono_l2, 0.1, 0.1);
        let mut sd = SatData::from_obs(&obs, |_| None);
        assert!(sd.form_iono_free(None));
        assert_float_eq!(sd.p3, rho, abs <= 1e-6);
    }

    #[test]
    fn phases_convert_to_meters() {
        let obs = gps_obs(12, 2.1e7, 2.1e7, 1000.0, 1000.0);
        let mut sd = SatData::from_obs(&obs, |_| None);
        assert!(sd.form_iono_free(None));

        let f1 = carrier_frequency(System::Gps, '1', 0).unwrap();
        assert_float_eq!(sd.l1, 1000.0 * C_LIGHT / f1, abs <= 1e-9);
        // lambda3 ties the combination's cycle count to meters
        assert!(sd.lambda3 > 0.0);
    }

    #[test]
    fn missing_band_leaves_combination_empty() {
        let mut obs = gps_obs(12, 2.1e7, 0.0, 1000.0, 1000.0);
        obs.obs[1].code_valid = false;
        let mut sd = SatData::from_obs(&obs, |_| None);
        assert!(!sd.form_iono_free(None));
        assert_eq!(sd.p3, 0.0);
    }

    #[test]
    fn glonass_needs_a_channel_number() {
        let mut obs = gps_obs(3, 2.1e7, 2.1e7, 1000.0, 1000.0);
        obs.prn = Prn::new(System::Glo, 3).unwrap();
        let mut sd = SatData::from_obs(&obs, |_| None);
        assert!(!sd.form_iono_free(None));
        assert!(sd.form_iono_free(Some(-4)));
    }

    #[test]
    fn code_bias_applies_by_matching_channel() {
        let obs = gps_obs(12, 2.1e7, 2.1e7, 1000.0, 1000.0);
        let sd = SatData::from_obs(&obs, |channel| match channel {
            "1W" => Some(1.5),
            // a bias for a code the receiver did not track is ignored
            "1C" => Some(99.0),
            _ => None,
        });
        assert_float_eq!(sd.p1, 2.1e7 + 1.5, abs <= 1e-9);
        assert_float_eq!(sd.p2, 2.1e7, abs <= 1e-9);
    }
}
