// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! PPP client
//!
//! One client estimates one rover. It owns the filter, a code bias table and
//! a handle onto the ephemeris store (shared with whatever decoders feed
//! it), and runs the per-epoch pipeline: condition the raw observations,
//! resolve each satellite's transmission time and state, then hand the epoch
//! to the filter.
//!
//! All operations of one client are meant to be called from a single logical
//! thread; clients for different rovers are fully independent.

use log::debug;

use crate::corrections::{ClkCorr, OrbCorr, SatCodeBias, SatPhaseBias, VTec};
use crate::ephemeris::{Eph, EphStore};
use crate::obs::{EpochData, SatData, SatObs};
use crate::ppp::filter::{FilterError, PppFilter};
use crate::ppp::options::PppOptions;
use crate::ppp::output::{epoch_summary, Output};
use crate::signal::consts::{C_LIGHT, MAX_PRN_INDEX};
use crate::signal::System;
use crate::time::GpsTime;

/// Transmission time convergence limit, expressed as a clock change scaled
/// to meters
const TOT_CONVERGENCE_M: f64 = 1.0e-4;

/// Why a satellite was dropped from an epoch
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
enum SatDrop {
    #[error("no ephemeris")]
    NoEphemeris,
    #[error("transmission time did not converge")]
    NoConvergence,
}

/// Real-time PPP engine for a single rover
pub struct PppClient {
    opt: PppOptions,
    store: EphStore,
    filter: PppFilter,
    code_biases: Vec<Option<SatCodeBias>>,
    phase_biases: Vec<Option<SatPhaseBias>>,
    vtec: Option<VTec>,
    /// Last epoch seen, used as the reference for ephemeris age checks
    last_time: Option<GpsTime>,
}

impl PppClient {
    /// A client with its own private ephemeris store
    #[must_use]
    pub fn new(opt: PppOptions) -> PppClient {
        PppClient::with_store(opt, EphStore::new())
    }

    /// A client sharing an ephemeris store with decoders or other feeders
    #[must_use]
    pub fn with_store(opt: PppOptions, store: EphStore) -> PppClient {
        let filter = PppFilter::new(&opt);
        PppClient {
            opt,
            store,
            filter,
            code_biases: vec![None; MAX_PRN_INDEX],
            phase_biases: vec![None; MAX_PRN_INDEX],
            vtec: None,
            last_time: None,
        }
    }

    /// The options the client was built with
    #[must_use]
    pub fn options(&self) -> &PppOptions {
        &self.opt
    }

    /// A handle onto the client's ephemeris store
    #[must_use]
    pub fn store(&self) -> EphStore {
        self.store.clone()
    }

    /// Insert a broadcast ephemeris, running the plausibility checks
    pub fn put_ephemeris(&mut self, eph: &Eph) {
        // before the first epoch there is no time reference, so the age
        // check runs against the ephemeris itself and always passes
        let now = self.last_time.unwrap_or_else(|| eph.toc());
        if let Err(e) = self.store.put(eph.clone(), true, &now) {
            debug!("{}: ephemeris not stored, {}", eph.prn(), e);
        }
    }

    /// Attach SSR orbit corrections to the matching stored ephemerides
    pub fn put_orb_corrections(&mut self, corrections: &[OrbCorr]) {
        self.store.apply_orb_corrections(corrections);
    }

    /// Attach SSR clock corrections to the matching stored ephemerides
    pub fn put_clk_corrections(&mut self, corrections: &[ClkCorr]) {
        self.store.apply_clk_corrections(corrections);
    }

    /// Replace the stored code biases of the listed satellites
    pub fn put_code_biases(&mut self, biases: &[SatCodeBias]) {
        for bias in biases {
            self.code_biases[bias.prn.index()] = Some(bias.clone());
        }
    }

    /// Accept phase biases; the current filter does not use them
    pub fn put_phase_biases(&mut self, biases: &[SatPhaseBias]) {
        for bias in biases {
            self.phase_biases[bias.prn.index()] = Some(bias.clone());
        }
    }

    /// Accept a vertical TEC model; the current filter does not use it
    pub fn put_tec(&mut self, vtec: &VTec) {
        self.vtec = Some(vtec.clone());
    }

    /// The stored phase biases of a satellite, if any arrived
    #[must_use]
    pub fn phase_biases(&self, prn: &crate::signal::Prn) -> Option<&SatPhaseBias> {
        self.phase_biases[prn.index()].as_ref()
    }

    /// The stored vertical TEC model, if one arrived
    #[must_use]
    pub fn tec(&self) -> Option<&VTec> {
        self.vtec.as_ref()
    }

    /// Discard the filter, the ephemeris store contents and the bias
    /// tables; the options stay as configured
    pub fn reset(&mut self) {
        self.filter = PppFilter::new(&self.opt);
        self.store.clear();
        for slot in self.code_biases.iter_mut() {
            *slot = None;
        }
        for slot in self.phase_biases.iter_mut() {
            *slot = None;
        }
        self.vtec = None;
        self.last_time = None;
    }

    /// Process one epoch of observations and produce a position estimate
    ///
    /// Failures never carry across epochs: a failed epoch sets
    /// [`Output::error`] and leaves the filter ready for the next one.
    pub fn process_epoch(&mut self, observations: &[SatObs]) -> Output {
        let mut output = Output::default();
        let mut log = String::new();

        // ---- conditioning ---------------------------------------------
        let mut epoch = EpochData::default();
        for obs in observations {
            if !self.opt.use_system(obs.prn.system()) {
                continue;
            }
            if epoch.time.is_none() {
                epoch.time = Some(obs.time);
            }

            let table = self.code_biases[obs.prn.index()].as_ref();
            let mut sd = SatData::from_obs(obs, |channel| {
                table.and_then(|bias| bias.bias_for(channel))
            });

            let slot = if obs.prn.system() == System::Glo {
                self.store.glo_slot(&obs.prn)
            } else {
                None
            };
            if sd.form_iono_free(slot) {
                epoch.sats.insert(obs.prn, sd);
            } else {
                debug!("{}: incomplete dual-frequency set, dropped", obs.prn);
            }
        }

        if epoch.time.is_some() {
            self.last_time = epoch.time;
        }

        // ---- satellite states -----------------------------------------
        let store = &self.store;
        let use_corr = self.opt.use_orb_clk_corr;
        epoch.sats.retain(|prn, sd| {
            match resolve_transmission_time(store, sd, use_corr) {
                Ok(()) => true,
                Err(reason) => {
                    log.push_str(&format!("{}: {}, dropped\n", prn, reason));
                    false
                }
            }
        });

        // ---- estimation -----------------------------------------------
        match self.filter.update(&mut epoch, &self.opt, &mut log) {
            Ok(()) => {
                output.error = false;
                output.epoch_time = self.filter.time();
                output.xyz = self.filter.xyz();
                output.cov = self.filter.cov_upper_triangle();
                output.neu = self.filter.neu();
                output.num_sat = self.filter.num_sat();
                output.hdop = self.filter.hdop();
                output.trp0 = self.filter.trp0();
                output.trp = self.filter.trp();
                output.trp_stdev = self.filter.trp_stdev();
                log.push_str(&epoch_summary(&output));
                log.push('\n');
            }
            Err(FilterError::InsufficientSatellites(_))
            | Err(FilterError::NumericalFailure) => {
                output.error = true;
            }
        }

        output.log = log;
        output
    }
}

/// Resolve the signal time of transmission of one satellite by iterating
/// pseudorange and satellite clock, and record the satellite state
///
/// Converges when the clock change scaled to meters drops below 0.1 mm;
/// ten rounds are plenty for any sane pseudorange.
fn resolve_transmission_time(
    store: &EphStore,
    sd: &mut SatData,
    use_corr: bool,
) -> Result<(), SatDrop> {
    let prange = sd.p3;
    if prange == 0.0 {
        return Err(SatDrop::NoEphemeris);
    }

    let mut clk_sat = 0.0;
    for _ in 0..10 {
        let tot = sd.time - prange / C_LIGHT - clk_sat;
        let state = store
            .sat_state(&sd.prn, &tot, use_corr)
            .map_err(|_| SatDrop::NoEphemeris)?;

        let clk_old = clk_sat;
        clk_sat = state.clock;

        if (clk_sat - clk_old).abs() * C_LIGHT < TOT_CONVERGENCE_M {
            sd.sat_pos = state.pos;
            sd.sat_vel = state.vel;
            sd.sat_clock_m = clk_sat * C_LIGHT;
            return Ok(());
        }
    }

    Err(SatDrop::NoConvergence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{LLHRadians, ECEF, OMEGA_EARTH};
    use crate::ephemeris::test_utils::test_gps_eph;
    use crate::ephemeris::{BroadcastEph, GpsEph, KeplerParams};
    use crate::obs::FrqObs;
    use crate::ppp::filter::sagnac_range;
    use crate::signal::{carrier_frequency, Prn};
    use crate::trop;
    use float_eq::assert_float_eq;
    use nalgebra::Vector3;

    const D2R: f64 = std::f64::consts::PI / 180.0;

    fn rover_truth() -> Vector3<f64> {
        *LLHRadians::new(45.0 * D2R, 10.0 * D2R, 400.0)
            .to_ecef()
            .as_vector_ref()
    }

    /// Ephemerides whose ground tracks pass near the rover, so the whole
    /// small constellation is at high elevation
    fn visible_constellation(toc: GpsTime) -> Vec<Eph> {
        let lat = 45.0 * D2R;
        let lon = 10.0 * D2R;
        let inc = 0.96_f64;
        let omega = 0.3_f64;

        // argument of latitude and in-plane longitude of the zenith pass
        let u_star = (lat.sin() / inc.sin()).asin();
        let lam_p = (inc.cos() * u_star.sin()).atan2(u_star.cos());
        let omega0_star = lon + OMEGA_EARTH * toc.tow() - lam_p;
        let m0_star = u_star - omega;

        (0..6)
            .map(|k| {
                let prn = Prn::new(System::Gps, (k + 1) as u8).unwrap();
                Eph::new(BroadcastEph::Gps(GpsEph {
                    prn,
                    toc,
                    toe: toc,
                    iode: 50 + k as u32,
                    health: 0,
                    af: [2.0e-5, 0.0, 0.0],
                    kepler: KeplerParams {
                        sqrt_a: 26_560_000.0_f64.sqrt(),
                        ecc: 0.001,
                        i0: inc,
                        omega0: omega0_star + (k as f64 - 2.5) * 0.06,
                        m0: m0_star + (k as f64 - 2.5) * 0.10,
                        omega,
                        delta_n: 0.0,
                        idot: 0.0,
                        omega_dot: 0.0,
                        ..KeplerParams::default()
                    },
                }))
            })
            .collect()
    }

    /// Observations consistent with the ephemeris states and the client's
    /// transmission time and measurement models
    fn synth_obs(
        eph: &Eph,
        rover: &Vector3<f64>,
        t: GpsTime,
        clk_rx_m: f64,
        wet_m: f64,
        amb_m: f64,
    ) -> SatObs {
        let height = ECEF::from_vector3(*rover).to_llh().height();
        let mut p3 = 2.2e7;
        let mut state = eph.state_at(&t, false).unwrap();
        for _ in 0..20 {
            let tot = t - p3 / C_LIGHT - state.clock;
            state = eph.state_at(&tot, false).unwrap();
            let azel = ECEF::from_vector3(*rover).azel_to(&ECEF::from_vector3(state.pos));
            let trop_total = trop::saastamoinen_delay(height, azel.el())
                + wet_m * trop::wet_mapping(azel.el());
            p3 = sagnac_range(&state.pos, rover) + clk_rx_m - state.clock * C_LIGHT + trop_total;
        }
        let l3 = p3 + amb_m;

        let f1 = carrier_frequency(System::Gps, '1', 0).unwrap();
        let f2 = carrier_frequency(System::Gps, '2', 0).unwrap();

        let mut o1 = FrqObs::new("1W");
        o1.code = p3;
        o1.code_valid = true;
        o1.phase = l3 * f1 / C_LIGHT;
        o1.phase_valid = true;
        let mut o2 = FrqObs::new("2W");
        o2.code = p3;
        o2.code_valid = true;
        o2.phase = l3 * f2 / C_LIGHT;
        o2.phase_valid = true;

        SatObs {
            prn: eph.prn(),
            time: t,
            obs: vec![o1, o2],
        }
    }

    #[test]
    fn end_to_end_static_positioning() {
        let rover = rover_truth();
        let toc = GpsTime::new(2100, 345_600.0).unwrap();
        let ephs = visible_constellation(toc);

        let opt = PppOptions {
            xyz_apr_rover: [rover[0] + 20.0, rover[1] - 15.0, rover[2] + 10.0],
            apr_sig_crd: [100.0; 3],
            noise_crd: [0.0; 3],
            ..PppOptions::default()
        };
        let mut client = PppClient::new(opt);
        for eph in &ephs {
            client.put_ephemeris(eph);
        }

        let mut last = Output::default();
        for k in 0..40 {
            let t = toc + (100.0 + k as f64);
            let obs: Vec<SatObs> = ephs
                .iter()
                .enumerate()
                .map(|(i, eph)| {
                    synth_obs(eph, &rover, t, 150.0, 0.07, 4.2 + 3.0 * i as f64)
                })
                .collect();
            last = client.process_epoch(&obs);
            assert!(!last.error, "epoch {} failed: {}", k, last.log);
        }

        assert_eq!(last.num_sat, 6);
        for i in 0..3 {
            assert!(
                (last.xyz[i] - rover[i]).abs() < 0.5,
                "axis {}: {} vs {}",
                i,
                last.xyz[i],
                rover[i]
            );
        }
        assert!(last.cov[0].sqrt() < 0.5);
        assert!(last.hdop > 0.0);
        assert!(last.log.contains("X = "));
        // NEU is measured against the (offset) a priori position
        assert!(last.neu[0].abs() < 30.0 && last.neu[0].abs() > 1.0);
    }

    #[test]
    fn satellites_without_ephemeris_are_dropped() {
        let rover = rover_truth();
        let toc = GpsTime::new(2100, 345_600.0).unwrap();
        let ephs = visible_constellation(toc);

        let mut client = PppClient::new(PppOptions {
            xyz_apr_rover: [rover[0], rover[1], rover[2]],
            ..PppOptions::default()
        });
        // only three of the six ephemerides are known
        for eph in &ephs[..3] {
            client.put_ephemeris(eph);
        }

        let t = toc + 100.0;
        let obs: Vec<SatObs> = ephs
            .iter()
            .map(|eph| synth_obs(eph, &rover, t, 150.0, 0.07, 4.2))
            .collect();
        let output = client.process_epoch(&obs);

        // three usable satellites are below the floor of four
        assert!(output.error);
        assert!(output.log.contains("no ephemeris"));
        assert!(output.log.contains("insufficient satellites"));
    }

    #[test]
    fn reset_discards_state_but_not_options() {
        let toc = GpsTime::new(2100, 345_600.0).unwrap();
        let eph = test_gps_eph(5, toc, 10);

        let opt = PppOptions {
            min_obs: 5,
            ..PppOptions::default()
        };
        let mut client = PppClient::new(opt);
        client.put_ephemeris(&eph);
        assert!(client.store().last(&eph.prn()).is_some());

        client.reset();
        assert!(client.store().last(&eph.prn()).is_none());
        assert_eq!(client.options().min_obs, 5);
    }

    #[test]
    fn corrections_attach_through_the_client() {
        let toc = GpsTime::new(2100, 345_600.0).unwrap();
        let eph = test_gps_eph(5, toc, 10);
        let mut client = PppClient::new(PppOptions::default());
        client.put_ephemeris(&eph);

        client.put_orb_corrections(&[OrbCorr {
            prn: eph.prn(),
            iod: 10,
            time: toc,
            rac: [1.0, 0.0, 0.0],
            dot_rac: [0.0; 3],
        }]);
        client.put_clk_corrections(&[ClkCorr {
            prn: eph.prn(),
            iod: 10,
            time: toc,
            dclk: [0.5, 0.0, 0.0],
        }]);

        let stored = client.store().last(&eph.prn()).unwrap();
        let plain = stored.state_at(&toc, false).unwrap();
        let corrected = stored.state_at(&toc, true).unwrap();
        assert!((plain.pos - corrected.pos).norm() > 0.9);
        assert_float_eq!(
            corrected.clock - plain.clock,
            0.5 / C_LIGHT,
            abs <= 1e-12
        );
    }

    #[test]
    fn transmission_time_iteration_converges() {
        let rover = rover_truth();
        let toc = GpsTime::new(2100, 345_600.0).unwrap();
        let ephs = visible_constellation(toc);
        let store = EphStore::new();
        store.put(ephs[0].clone(), false, &toc).unwrap();

        let t = toc + 100.0;
        let obs = synth_obs(&ephs[0], &rover, t, 150.0, 0.07, 4.2);
        let mut sd = SatData::from_obs(&obs, |_| None);
        assert!(sd.form_iono_free(None));

        resolve_transmission_time(&store, &mut sd, false).unwrap();
        assert!(sd.sat_pos.norm() > 2.0e7);
        // clock scaled to meters: af0 of 2e-5 s is about 6 km, with the
        // relativistic term contributing below a meter
        assert_float_eq!(sd.sat_clock_m, 2.0e-5 * C_LIGHT, abs <= 1.0);
    }
}
