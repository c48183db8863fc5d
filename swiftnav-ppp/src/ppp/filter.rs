// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Sequential Kalman filter for Precise Point Positioning
//!
//! The state vector is the rover ECEF position, the receiver clock offset
//! scaled to meters, the tropospheric zenith wet delay, and one float
//! ambiguity per tracked satellite phase. Observations are the per-satellite
//! ionosphere-free code and phase combinations; they are processed
//! sequentially, each one screened against its prediction residual before
//! it is allowed in.
//!
//! The receiver clock is whitened every epoch: its value is resampled from
//! the code observations and its variance reset, so clock excursions never
//! leak into the other states. Ambiguities live as long as their satellite
//! keeps being observed; a cycle slip, a residual rejection or an
//! observation gap beyond the tolerance reinitializes them.
//!
//! An epoch update either commits entirely or leaves the filter untouched.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Vector3};

use crate::coords::{ECEF, OMEGA_EARTH};
use crate::obs::{EpochData, SatData};
use crate::ppp::options::{LinearCombination, PppOptions};
use crate::signal::consts::C_LIGHT;
use crate::signal::Prn;
use crate::time::GpsTime;
use crate::trop;

const IDX_X: usize = 0;
const IDX_Y: usize = 1;
const IDX_Z: usize = 2;
const IDX_CLK: usize = 3;
const IDX_TRP: usize = 4;
const NUM_CORE: usize = 5;

/// Observation gap beyond which an ambiguity is no longer trusted, s
pub(crate) const MAX_OBS_GAP_SECS: f64 = 60.0;

/// Jump of the phase-minus-code statistic that is treated as a cycle slip
/// even without a receiver flag, m
const SLIP_JUMP_M: f64 = 10.0;

/// Floor on the initial position variance when the position is unknown, m^2
const MIN_COLD_POS_VAR: f64 = 1.0e4;

/// An error encountered during an epoch update; the filter state is
/// unchanged unless stated otherwise
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FilterError {
    /// Fewer usable observations than the configured minimum
    #[error("not enough usable satellites ({0})")]
    InsufficientSatellites(usize),
    /// The covariance lost positive definiteness; the filter has been
    /// reinitialized and restarts on the next epoch
    #[error("covariance lost positive definiteness")]
    NumericalFailure,
}

/// What a state vector entry estimates
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ParamKind {
    CrdX,
    CrdY,
    CrdZ,
    RecClk,
    Trop,
    Amb(Prn),
}

/// The estimation state: parameter layout, values, covariance and the
/// per-satellite observation bookkeeping
#[derive(Clone)]
struct State {
    params: Vec<ParamKind>,
    xx: DVector<f64>,
    qq: DMatrix<f64>,
    last_seen: HashMap<Prn, GpsTime>,
}

impl State {
    fn new(opt: &PppOptions) -> State {
        let params = vec![
            ParamKind::CrdX,
            ParamKind::CrdY,
            ParamKind::CrdZ,
            ParamKind::RecClk,
            ParamKind::Trop,
        ];
        let mut xx = DVector::zeros(NUM_CORE);
        let mut qq = DMatrix::zeros(NUM_CORE, NUM_CORE);
        for i in 0..3 {
            xx[i] = opt.xyz_apr_rover[i];
            let sig = opt.apr_sig_crd[i];
            qq[(i, i)] = if sig > 0.0 {
                sig * sig
            } else {
                MIN_COLD_POS_VAR
            };
        }
        qq[(IDX_CLK, IDX_CLK)] = opt.noise_clk * opt.noise_clk;
        qq[(IDX_TRP, IDX_TRP)] = opt.apr_sig_trp * opt.apr_sig_trp;
        State {
            params,
            xx,
            qq,
            last_seen: HashMap::new(),
        }
    }

    fn dim(&self) -> usize {
        self.params.len()
    }

    fn amb_index(&self, prn: &Prn) -> Option<usize> {
        self.params.iter().position(|p| *p == ParamKind::Amb(*prn))
    }

    /// Append an ambiguity row with the given value and variance
    fn add_amb(&mut self, prn: Prn, value: f64, var: f64) {
        let n = self.dim();
        let mut xx = DVector::zeros(n + 1);
        xx.rows_mut(0, n).copy_from(&self.xx);
        xx[n] = value;
        let mut qq = DMatrix::zeros(n + 1, n + 1);
        qq.view_mut((0, 0), (n, n)).copy_from(&self.qq);
        qq[(n, n)] = var;
        self.params.push(ParamKind::Amb(prn));
        self.xx = xx;
        self.qq = qq;
    }

    /// Reinitialize an ambiguity row: decorrelate it and restart its value
    fn reset_amb(&mut self, idx: usize, value: f64, var: f64) {
        let n = self.dim();
        for j in 0..n {
            self.qq[(idx, j)] = 0.0;
            self.qq[(j, idx)] = 0.0;
        }
        self.qq[(idx, idx)] = var;
        self.xx[idx] = value;
    }

    /// Keep only the parameters whose indices are listed, preserving order
    fn select(&mut self, keep: &[usize]) {
        let m = keep.len();
        self.params = keep.iter().map(|&i| self.params[i]).collect();
        let xx = DVector::from_fn(m, |i, _| self.xx[keep[i]]);
        let qq = DMatrix::from_fn(m, m, |i, j| self.qq[(keep[i], keep[j])]);
        self.xx = xx;
        self.qq = qq;
    }
}

/// Geometric range from the rover to a satellite, with the satellite
/// rotated into the reception-time ECEF frame (signal travel time times
/// earth rotation)
pub(crate) fn sagnac_range(sat: &Vector3<f64>, rover: &Vector3<f64>) -> f64 {
    let rho0 = (sat - rover).norm();
    let phi = OMEGA_EARTH * rho0 / C_LIGHT;
    let (sin_p, cos_p) = (phi.sin(), phi.cos());
    let x = cos_p * sat[0] + sin_p * sat[1];
    let y = -sin_p * sat[0] + cos_p * sat[1];
    let dx = x - rover[0];
    let dy = y - rover[1];
    let dz = sat[2] - rover[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// The PPP estimation filter of one rover
#[derive(Clone)]
pub struct PppFilter {
    state: State,
    /// Epoch of the last committed update
    time: Option<GpsTime>,
    /// First epoch after (re)initialization, anchors the seeding window
    start_time: Option<GpsTime>,
    num_sat: usize,
    hdop: f64,
    neu: [f64; 3],
    trp0: f64,
}

impl PppFilter {
    /// A fresh filter seeded from the options
    #[must_use]
    pub fn new(opt: &PppOptions) -> PppFilter {
        PppFilter {
            state: State::new(opt),
            time: None,
            start_time: None,
            num_sat: 0,
            hdop: 0.0,
            neu: [0.0; 3],
            trp0: 0.0,
        }
    }

    /// Epoch of the last committed update
    #[must_use]
    pub fn time(&self) -> Option<GpsTime> {
        self.time
    }

    /// Rover position estimate, ECEF m
    #[must_use]
    pub fn xyz(&self) -> [f64; 3] {
        [self.state.xx[IDX_X], self.state.xx[IDX_Y], self.state.xx[IDX_Z]]
    }

    /// Upper triangle of the 3x3 position covariance, order xx, xy, xz,
    /// yy, yz, zz
    #[must_use]
    pub fn cov_upper_triangle(&self) -> [f64; 6] {
        let q = &self.state.qq;
        [
            q[(0, 0)],
            q[(0, 1)],
            q[(0, 2)],
            q[(1, 1)],
            q[(1, 2)],
            q[(2, 2)],
        ]
    }

    /// Rover position relative to the a priori position, north/east/up m
    #[must_use]
    pub fn neu(&self) -> [f64; 3] {
        self.neu
    }

    /// Satellites that contributed to the last update
    #[must_use]
    pub fn num_sat(&self) -> usize {
        self.num_sat
    }

    /// Horizontal dilution of precision of the last update
    #[must_use]
    pub fn hdop(&self) -> f64 {
        self.hdop
    }

    /// A priori tropospheric zenith delay of the last update, m
    #[must_use]
    pub fn trp0(&self) -> f64 {
        self.trp0
    }

    /// Estimated tropospheric zenith wet delay offset, m
    #[must_use]
    pub fn trp(&self) -> f64 {
        self.state.xx[IDX_TRP]
    }

    /// Standard deviation of the troposphere estimate, m
    #[must_use]
    pub fn trp_stdev(&self) -> f64 {
        self.state.qq[(IDX_TRP, IDX_TRP)].max(0.0).sqrt()
    }

    /// Current float ambiguity of a satellite, m
    #[must_use]
    pub fn ambiguity(&self, prn: &Prn) -> Option<f64> {
        self.state.amb_index(prn).map(|i| self.state.xx[i])
    }

    /// Current variance of a satellite's ambiguity, m^2
    #[must_use]
    pub fn ambiguity_variance(&self, prn: &Prn) -> Option<f64> {
        self.state.amb_index(prn).map(|i| self.state.qq[(i, i)])
    }

    /// Run the epoch update
    ///
    /// Fills elevation and azimuth of the observations, drops satellites
    /// below the elevation cutoff, manages the ambiguity rows and processes
    /// the ionosphere-free code and phase observations sequentially.
    ///
    /// # Errors
    ///
    /// On [`FilterError::InsufficientSatellites`] the filter state is
    /// unchanged. On [`FilterError::NumericalFailure`] the filter has been
    /// reinitialized from the options.
    pub fn update(
        &mut self,
        epoch: &mut EpochData,
        opt: &PppOptions,
        log: &mut String,
    ) -> Result<(), FilterError> {
        let t = match epoch.time {
            Some(t) => t,
            None => return Err(FilterError::InsufficientSatellites(0)),
        };

        // the update works on a copy and commits only on success
        let mut state = self.state.clone();
        let dt = self.time.map(|t0| t.diff(&t0)).unwrap_or(0.0);

        // ---- time update ----------------------------------------------
        for i in 0..3 {
            state.qq[(i, i)] += (opt.noise_crd[i] * dt).powi(2);
        }
        let n = state.dim();
        for j in 0..n {
            state.qq[(IDX_CLK, j)] = 0.0;
            state.qq[(j, IDX_CLK)] = 0.0;
        }
        state.qq[(IDX_CLK, IDX_CLK)] = opt.noise_clk * opt.noise_clk;
        if opt.estimates_tropo() {
            state.qq[(IDX_TRP, IDX_TRP)] += opt.noise_trp * opt.noise_trp * dt.abs();
        }

        // ---- geometry screening ---------------------------------------
        let rover = {
            let v = Vector3::new(state.xx[IDX_X], state.xx[IDX_Y], state.xx[IDX_Z]);
            if v.norm() > 0.0 {
                v
            } else {
                Vector3::from(opt.xyz_apr_rover)
            }
        };
        let rover_ecef = ECEF::from_vector3(rover);
        let height = rover_ecef.to_llh().height();

        let min_ele = opt.min_ele;
        epoch.sats.retain(|prn, sd| {
            if sd.p3 == 0.0 || sd.l3 == 0.0 {
                return false;
            }
            sd.azel = rover_ecef.azel_to(&ECEF::from_vector3(sd.sat_pos));
            if sd.azel.el() <= min_ele {
                debug!("{}: below elevation cutoff, dropped", prn);
                return false;
            }
            true
        });

        if epoch.sats.len() < opt.effective_min_obs() {
            log.push_str(&format!(
                "insufficient satellites: {} usable\n",
                epoch.sats.len()
            ));
            return Err(FilterError::InsufficientSatellites(epoch.sats.len()));
        }

        // ---- ambiguity lifecycle --------------------------------------
        // retire rows whose satellite has been gone past the gap tolerance
        let keep: Vec<usize> = state
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| match p {
                ParamKind::Amb(prn) => {
                    epoch.sats.contains_key(prn)
                        || state
                            .last_seen
                            .get(prn)
                            .map(|seen| t.diff(seen) <= MAX_OBS_GAP_SECS)
                            .unwrap_or(false)
                }
                _ => true,
            })
            .map(|(i, _)| i)
            .collect();
        if keep.len() < state.dim() {
            for (i, p) in state.params.iter().enumerate() {
                if let ParamKind::Amb(prn) = p {
                    if !keep.contains(&i) {
                        debug!("{}: ambiguity retired after observation gap", prn);
                        state.last_seen.remove(prn);
                    }
                }
            }
            state.select(&keep);
        }

        let amb_var = opt.apr_sig_amb * opt.apr_sig_amb;
        for (prn, sd) in epoch.sats.iter() {
            if !opt
                .lcs(prn.system())
                .contains(&LinearCombination::PhaseIonoFree)
            {
                continue;
            }
            match state.amb_index(prn) {
                None => {
                    state.add_amb(*prn, sd.l3 - sd.p3, amb_var);
                }
                Some(idx) => {
                    let jump = (sd.l3 - sd.p3 - state.xx[idx]).abs();
                    if sd.slip_flag || jump > SLIP_JUMP_M {
                        log.push_str(&format!("{}: cycle slip, ambiguity reset\n", prn));
                        state.reset_amb(idx, sd.l3 - sd.p3, amb_var);
                    }
                }
            }
            state.last_seen.insert(*prn, t);
        }

        // ---- receiver clock resampling --------------------------------
        let clock_samples: Vec<f64> = epoch
            .sats
            .values()
            .map(|sd| {
                let rho = sagnac_range(&sd.sat_pos, &rover);
                let el = sd.azel.el();
                let trop_total = trop::saastamoinen_delay(height, el)
                    + state.xx[IDX_TRP] * trop::wet_mapping(el);
                sd.p3 - rho + sd.sat_clock_m - trop_total
            })
            .collect();
        state.xx[IDX_CLK] = median(clock_samples);

        let seeding = match self.start_time {
            Some(t0) => t.diff(&t0) < opt.seeding_time,
            None => true,
        };

        // ---- sequential measurement updates ---------------------------
        let modeled = |xx: &DVector<f64>, sd: &SatData, amb_idx: Option<usize>| -> f64 {
            let rover = Vector3::new(xx[IDX_X], xx[IDX_Y], xx[IDX_Z]);
            let rho = sagnac_range(&sd.sat_pos, &rover);
            let el = sd.azel.el();
            let trop_total =
                trop::saastamoinen_delay(height, el) + xx[IDX_TRP] * trop::wet_mapping(el);
            let mut model = rho + xx[IDX_CLK] - sd.sat_clock_m + trop_total;
            if let Some(i) = amb_idx {
                model += xx[i];
            }
            model
        };

        let mut used: BTreeSet<Prn> = BTreeSet::new();
        for phase_pass in [false, true].iter().copied() {
            for (prn, sd) in epoch.sats.iter() {
                let wanted = if phase_pass {
                    LinearCombination::PhaseIonoFree
                } else {
                    LinearCombination::CodeIonoFree
                };
                if !opt.lcs(prn.system()).contains(&wanted) {
                    continue;
                }
                let amb_idx = if phase_pass {
                    match state.amb_index(prn) {
                        Some(i) => Some(i),
                        None => continue,
                    }
                } else {
                    None
                };

                let n = state.dim();
                let rover_now =
                    Vector3::new(state.xx[IDX_X], state.xx[IDX_Y], state.xx[IDX_Z]);
                let rho = sagnac_range(&sd.sat_pos, &rover_now);
                let el = sd.azel.el();

                let mut h = DVector::zeros(n);
                h[IDX_X] = (rover_now[0] - sd.sat_pos[0]) / rho;
                h[IDX_Y] = (rover_now[1] - sd.sat_pos[1]) / rho;
                h[IDX_Z] = (rover_now[2] - sd.sat_pos[2]) / rho;
                h[IDX_CLK] = 1.0;
                if opt.estimates_tropo() {
                    h[IDX_TRP] = trop::wet_mapping(el);
                }
                if let Some(i) = amb_idx {
                    h[i] = 1.0;
                }

                let obs = if phase_pass { sd.l3 } else { sd.p3 };
                let v = obs - modeled(&state.xx, sd, amb_idx);

                let mut r = if phase_pass {
                    opt.sigma_l1 * opt.sigma_l1
                } else {
                    opt.sigma_c1 * opt.sigma_c1
                };
                let weighted = if phase_pass {
                    opt.ele_wgt_phase
                } else {
                    opt.ele_wgt_code
                };
                if weighted {
                    r /= el.sin() * el.sin();
                }

                let ph = &state.qq * &h;
                let s = h.dot(&ph) + r;

                // Residual screening on the prediction residual. The gate
                // widens with the innovation uncertainty so a cold filter
                // can pull in large residuals; the ambiguity's own variance
                // stays out of the gate, otherwise a freshly reset (and
                // thus wide open) ambiguity would mask the very slips the
                // screen is there to catch.
                let s_gate = if let Some(i) = amb_idx {
                    let mut hg = h.clone();
                    hg[i] = 0.0;
                    hg.dot(&(&state.qq * &hg)) + r
                } else {
                    s
                };
                let max_res = if phase_pass {
                    opt.max_res_l1
                } else {
                    opt.max_res_c1
                };
                if !seeding && v.abs() > max_res + 3.0 * s_gate.max(0.0).sqrt() {
                    let kind = if phase_pass { "phase" } else { "code" };
                    warn!("{}: {} residual {:.3} m rejected", prn, kind, v);
                    log.push_str(&format!(
                        "{}: {} residual {:.3} m exceeds threshold, excluded\n",
                        prn, kind, v
                    ));
                    if let Some(i) = state.amb_index(prn) {
                        state.reset_amb(i, sd.l3 - sd.p3, amb_var);
                    }
                    continue;
                }

                let gain = &ph / s;
                let xx_new = &state.xx + &gain * v;
                let mut qq_new = &state.qq - &gain * ph.transpose();
                qq_new = (&qq_new + &qq_new.transpose()) * 0.5;

                state.xx = xx_new;
                state.qq = qq_new;
                used.insert(*prn);
            }
        }

        if used.len() < opt.effective_min_obs() {
            log.push_str(&format!(
                "insufficient satellites after screening: {} used\n",
                used.len()
            ));
            return Err(FilterError::InsufficientSatellites(used.len()));
        }

        // ---- numerical health -----------------------------------------
        if nalgebra::Cholesky::new(state.qq.clone()).is_none() {
            warn!("covariance not positive definite, filter restarts");
            log.push_str("numerical failure, filter restarts\n");
            *self = PppFilter::new(opt);
            return Err(FilterError::NumericalFailure);
        }

        // ---- derived outputs ------------------------------------------
        let pos = Vector3::new(state.xx[IDX_X], state.xx[IDX_Y], state.xx[IDX_Z]);
        let apr = Vector3::from(opt.xyz_apr_rover);
        let reference = if opt.has_apr_position() {
            ECEF::from_vector3(apr)
        } else {
            ECEF::from_vector3(pos)
        };
        let rot = reference.to_llh().rotation_to_neu();
        let dneu = rot * (pos - apr);
        self.neu = [dneu[0], dneu[1], dneu[2]];

        let q3 = state.qq.fixed_view::<3, 3>(0, 0).into_owned();
        let q_neu = rot * q3 * rot.transpose();
        self.hdop = (q_neu[(0, 0)] + q_neu[(1, 1)]).max(0.0).sqrt() / opt.sigma_c1;

        self.trp0 = trop::saastamoinen_delay(height, std::f64::consts::FRAC_PI_2);
        self.num_sat = used.len();

        self.state = state;
        self.time = Some(t);
        if self.start_time.is_none() {
            self.start_time = Some(t);
        }

        Ok(())
    }
}
