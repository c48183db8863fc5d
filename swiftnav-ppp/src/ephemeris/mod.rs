// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Broadcast ephemerides and satellite state evaluation
//!
//! A broadcast ephemeris is a tagged variant over the constellation-specific
//! message layouts. All variants share one capability set: a reference time,
//! an issue-of-data tag, health information, and the ability to evaluate
//! satellite position, velocity and clock offset at an arbitrary time.
//!
//! GPS, Galileo and BeiDou broadcast Keplerian elements with harmonic
//! perturbations; GLONASS broadcasts a Cartesian state vector that is
//! numerically integrated; SBAS broadcasts a short polynomial.
//!
//! SSR orbit and clock corrections attach to a specific ephemeris (matched by
//! issue-of-data elsewhere) and, when enabled, are applied during state
//! evaluation: the orbit delta in the orbit-local radial/along-track/
//! cross-track frame, the clock delta as a polynomial in meters.

mod store;

pub use store::*;

use nalgebra::Vector3;

use crate::corrections::{ClkCorr, OrbCorr};
use crate::signal::consts::C_LIGHT;
use crate::signal::Prn;
use crate::time::GpsTime;

/// Earth gravitational constant for GPS user algorithms, m^3/s^2
const GM_GPS: f64 = 3.986_005e14;
/// Earth gravitational constant for Galileo and BeiDou user algorithms, m^3/s^2
const GM_GAL: f64 = 3.986_004_418e14;
/// Earth rotation rate, rad/s (WGS84 / GTRF)
const OMEGA_EARTH: f64 = 7.292_115_146_7e-5;
/// Earth rotation rate used by the BeiDou ICD, rad/s
const OMEGA_EARTH_BDS: f64 = 7.292_115e-5;
/// Relativistic clock correction constant, s/m^0.5
const F_REL: f64 = -4.442_807_633e-10;

/// PZ-90 gravitational constant, m^3/s^2
const GM_GLO: f64 = 3.986_004_4e14;
/// PZ-90 equatorial radius, m
const RE_GLO: f64 = 6_378_136.0;
/// PZ-90 second zonal harmonic
const J2_GLO: f64 = 1.082_625_7e-3;
/// PZ-90 earth rotation rate, rad/s
const OMEGA_GLO: f64 = 7.292_115e-5;
/// GLONASS integration step, s
const GLO_STEP: f64 = 60.0;

/// Step used for numerical velocity differencing, s
const VEL_DIFF_STEP: f64 = 1.0e-3;

/// cos(-5 deg) / sin(-5 deg), the BeiDou GEO inclined-frame rotation
const COS_N5: f64 = 0.996_194_698_091_745_5;
const SIN_N5: f64 = -0.087_155_742_747_658_17;

/// Quality tag of a stored ephemeris
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CheckState {
    /// Not yet checked
    Unchecked,
    /// Passed the plausibility checks
    Ok,
    /// Failed a plausibility check, never used
    Bad,
    /// Too old to be used
    Outdated,
    /// Flagged unhealthy by the broadcast message
    Unhealthy,
}

/// An error encountered while evaluating satellite state
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum EphError {
    /// The ephemeris was tagged bad or unhealthy and may not be used
    #[error("ephemeris is unusable")]
    Unusable,
}

/// Satellite state at a point in time
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SatState {
    /// ECEF position, m
    pub pos: Vector3<f64>,
    /// ECEF velocity, m/s
    pub vel: Vector3<f64>,
    /// Satellite clock offset, s
    pub clock: f64,
}

/// Keplerian broadcast elements shared by the GPS, Galileo and BeiDou
/// message layouts
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeplerParams {
    /// Square root of the semi-major axis, m^0.5
    pub sqrt_a: f64,
    /// Eccentricity
    pub ecc: f64,
    /// Inclination at reference time, rad
    pub i0: f64,
    /// Longitude of ascending node at weekly epoch, rad
    pub omega0: f64,
    /// Mean anomaly at reference time, rad
    pub m0: f64,
    /// Argument of perigee, rad
    pub omega: f64,
    /// Mean motion difference, rad/s
    pub delta_n: f64,
    /// Inclination rate, rad/s
    pub idot: f64,
    /// Rate of right ascension, rad/s
    pub omega_dot: f64,
    /// Harmonic correction terms, rad / rad / m
    pub cuc: f64,
    pub cus: f64,
    pub cic: f64,
    pub cis: f64,
    pub crc: f64,
    pub crs: f64,
}

/// GPS (and QZSS) LNAV broadcast ephemeris
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsEph {
    pub prn: Prn,
    /// Time of clock
    pub toc: GpsTime,
    /// Time of ephemeris
    pub toe: GpsTime,
    /// Issue of data, ephemeris
    pub iode: u32,
    /// SV health word, zero when healthy
    pub health: u16,
    /// Clock polynomial a_f0, a_f1, a_f2 (s, s/s, s/s^2)
    pub af: [f64; 3],
    pub kepler: KeplerParams,
}

/// Galileo I/NAV broadcast ephemeris
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GalEph {
    pub prn: Prn,
    pub toc: GpsTime,
    pub toe: GpsTime,
    /// Issue of data, navigation
    pub iod_nav: u32,
    /// Combined signal health, zero when healthy
    pub health: u16,
    pub af: [f64; 3],
    pub kepler: KeplerParams,
}

/// BeiDou D1/D2 broadcast ephemeris
///
/// Reference times must already be expressed in GPS time; the BDT offset is
/// the decoder's business.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BdsEph {
    pub prn: Prn,
    pub toc: GpsTime,
    pub toe: GpsTime,
    /// Age of data, ephemeris
    pub aode: u32,
    /// SatH1 flag, zero when healthy
    pub health: u16,
    pub af: [f64; 3],
    pub kepler: KeplerParams,
}

/// GLONASS broadcast ephemeris, a Cartesian state vector at the reference
/// time plus luni-solar accelerations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GloEph {
    pub prn: Prn,
    /// Reference time t_b, already converted to GPS time
    pub toc: GpsTime,
    /// Issue of data derived from t_b
    pub iod: u32,
    /// B_n health flag, zero when healthy
    pub health: u16,
    /// Clock offset -tau_n, entering as tau_n, s
    pub tau: f64,
    /// Relative frequency offset gamma_n
    pub gamma: f64,
    /// Frequency channel number, -7..=6
    pub slot: i16,
    /// ECEF position at t_b, m
    pub pos: [f64; 3],
    /// ECEF velocity at t_b, m/s
    pub vel: [f64; 3],
    /// Luni-solar acceleration at t_b, m/s^2
    pub acc: [f64; 3],
}

/// SBAS broadcast ephemeris, a position/velocity/acceleration polynomial
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SbasEph {
    pub prn: Prn,
    pub toc: GpsTime,
    /// Issue of data
    pub iod: u32,
    /// Health flags, zero when healthy
    pub health: u16,
    /// Clock offset and drift, s and s/s
    pub agf: [f64; 2],
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub acc: [f64; 3],
}

/// The constellation-specific broadcast message payloads
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BroadcastEph {
    Gps(GpsEph),
    Glo(GloEph),
    Gal(GalEph),
    Bds(BdsEph),
    Sbas(SbasEph),
}

/// A broadcast ephemeris with its lifecycle state and any attached SSR
/// corrections
#[derive(Debug, Clone, PartialEq)]
pub struct Eph {
    data: BroadcastEph,
    check_state: CheckState,
    orb_corr: Option<OrbCorr>,
    clk_corr: Option<ClkCorr>,
}

impl Eph {
    /// Wrap a decoded broadcast message
    ///
    /// An ephemeris flagged unhealthy by its own message starts out in the
    /// [`CheckState::Unhealthy`] state and is never evaluated.
    #[must_use]
    pub fn new(data: BroadcastEph) -> Eph {
        let check_state = if Self::health_word(&data) != 0 {
            CheckState::Unhealthy
        } else {
            CheckState::Unchecked
        };
        Eph {
            data,
            check_state,
            orb_corr: None,
            clk_corr: None,
        }
    }

    fn health_word(data: &BroadcastEph) -> u16 {
        match data {
            BroadcastEph::Gps(e) => e.health,
            BroadcastEph::Glo(e) => e.health,
            BroadcastEph::Gal(e) => e.health,
            BroadcastEph::Bds(e) => e.health,
            BroadcastEph::Sbas(e) => e.health,
        }
    }

    /// The constellation-specific payload
    #[must_use]
    pub fn data(&self) -> &BroadcastEph {
        &self.data
    }

    /// Satellite the ephemeris belongs to
    #[must_use]
    pub fn prn(&self) -> Prn {
        match &self.data {
            BroadcastEph::Gps(e) => e.prn,
            BroadcastEph::Glo(e) => e.prn,
            BroadcastEph::Gal(e) => e.prn,
            BroadcastEph::Bds(e) => e.prn,
            BroadcastEph::Sbas(e) => e.prn,
        }
    }

    /// Reference time of clock
    #[must_use]
    pub fn toc(&self) -> GpsTime {
        match &self.data {
            BroadcastEph::Gps(e) => e.toc,
            BroadcastEph::Glo(e) => e.toc,
            BroadcastEph::Gal(e) => e.toc,
            BroadcastEph::Bds(e) => e.toc,
            BroadcastEph::Sbas(e) => e.toc,
        }
    }

    /// Issue-of-data tag used to match SSR corrections
    #[must_use]
    pub fn iod(&self) -> u32 {
        match &self.data {
            BroadcastEph::Gps(e) => e.iode,
            BroadcastEph::Glo(e) => e.iod,
            BroadcastEph::Gal(e) => e.iod_nav,
            BroadcastEph::Bds(e) => e.aode,
            BroadcastEph::Sbas(e) => e.iod,
        }
    }

    /// GLONASS frequency channel number, if this is a GLONASS ephemeris
    #[must_use]
    pub fn slot(&self) -> Option<i16> {
        match &self.data {
            BroadcastEph::Glo(e) => Some(e.slot),
            _ => None,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn check_state(&self) -> CheckState {
        self.check_state
    }

    pub(crate) fn set_check_state(&mut self, state: CheckState) {
        self.check_state = state;
    }

    /// Whether this ephemeris supersedes `other` for the same satellite
    ///
    /// Later reference time wins; for identical reference times a changed
    /// issue-of-data indicates a data set update.
    #[must_use]
    pub fn is_newer_than(&self, other: &Eph) -> bool {
        let dt = self.toc().diff(&other.toc());
        if dt.abs() > 1e-9 {
            dt > 0.0
        } else {
            self.iod() != other.iod() && self.iod() > other.iod()
        }
    }

    /// Attach an SSR orbit correction, replacing any prior attachment
    pub fn set_orb_corr(&mut self, corr: OrbCorr) {
        self.orb_corr = Some(corr);
    }

    /// Attach an SSR clock correction, replacing any prior attachment
    pub fn set_clk_corr(&mut self, corr: ClkCorr) {
        self.clk_corr = Some(corr);
    }

    /// Evaluate satellite position, velocity and clock offset at `t`
    ///
    /// With `apply_corr` set, attached SSR corrections are applied: the orbit
    /// delta is propagated to `t` with its rates and subtracted from the
    /// broadcast position in the radial/along-track/cross-track frame, the
    /// clock polynomial is added to the broadcast clock.
    ///
    /// # Errors
    ///
    /// Fails when the ephemeris is tagged bad or unhealthy.
    pub fn state_at(&self, t: &GpsTime, apply_corr: bool) -> Result<SatState, EphError> {
        if self.check_state == CheckState::Bad || self.check_state == CheckState::Unhealthy {
            return Err(EphError::Unusable);
        }

        let mut state = self.raw_state_at(t);

        if apply_corr {
            if let Some(oc) = &self.orb_corr {
                let dt = t.diff(&oc.time);
                let rac = [
                    oc.rac[0] + oc.dot_rac[0] * dt,
                    oc.rac[1] + oc.dot_rac[1] * dt,
                    oc.rac[2] + oc.dot_rac[2] * dt,
                ];
                let along = state.vel.normalize();
                let cross = state.pos.cross(&state.vel).normalize();
                let radial = along.cross(&cross);
                state.pos -= radial * rac[0] + along * rac[1] + cross * rac[2];

                let dot_rac = oc.dot_rac;
                state.vel -= radial * dot_rac[0] + along * dot_rac[1] + cross * dot_rac[2];
            }
            if let Some(cc) = &self.clk_corr {
                state.clock += cc.value_at(t) / C_LIGHT;
            }
        }

        Ok(state)
    }

    fn raw_state_at(&self, t: &GpsTime) -> SatState {
        match &self.data {
            BroadcastEph::Gps(e) => kepler_state(
                t,
                &e.toc,
                &e.toe,
                &e.af,
                &e.kepler,
                GM_GPS,
                OMEGA_EARTH,
                false,
            ),
            BroadcastEph::Gal(e) => kepler_state(
                t,
                &e.toc,
                &e.toe,
                &e.af,
                &e.kepler,
                GM_GAL,
                OMEGA_EARTH,
                false,
            ),
            BroadcastEph::Bds(e) => {
                // GEO satellites use the inclined BeiDou frame
                let geo = e.prn.number() <= 5 || e.prn.number() >= 59;
                kepler_state(
                    t,
                    &e.toc,
                    &e.toe,
                    &e.af,
                    &e.kepler,
                    GM_GAL,
                    OMEGA_EARTH_BDS,
                    geo,
                )
            }
            BroadcastEph::Glo(e) => glo_state(t, e),
            BroadcastEph::Sbas(e) => sbas_state(t, e),
        }
    }
}

/// Evaluate the Keplerian broadcast model
#[allow(clippy::too_many_arguments)]
fn kepler_state(
    t: &GpsTime,
    toc: &GpsTime,
    toe: &GpsTime,
    af: &[f64; 3],
    k: &KeplerParams,
    gm: f64,
    omega_e: f64,
    geo: bool,
) -> SatState {
    let pos = kepler_position(t, toe, k, gm, omega_e, geo);
    let ahead = *t + VEL_DIFF_STEP;
    let pos1 = kepler_position(&ahead, toe, k, gm, omega_e, geo);
    let vel = (pos1 - pos) / VEL_DIFF_STEP;

    let a = k.sqrt_a * k.sqrt_a;
    let tk = wrap_half_week(t.diff(toe));
    let n = (gm / (a * a * a)).sqrt() + k.delta_n;
    let e_anom = eccentric_anomaly(k.m0 + n * tk, k.ecc);

    let dt = t.diff(toc);
    let clock =
        af[0] + af[1] * dt + af[2] * dt * dt + F_REL * k.ecc * k.sqrt_a * e_anom.sin();

    SatState { pos, vel, clock }
}

fn kepler_position(
    t: &GpsTime,
    toe: &GpsTime,
    k: &KeplerParams,
    gm: f64,
    omega_e: f64,
    geo: bool,
) -> Vector3<f64> {
    let a = k.sqrt_a * k.sqrt_a;
    let tk = wrap_half_week(t.diff(toe));

    let n = (gm / (a * a * a)).sqrt() + k.delta_n;
    let e_anom = eccentric_anomaly(k.m0 + n * tk, k.ecc);
    let (sin_e, cos_e) = (e_anom.sin(), e_anom.cos());

    let v = ((1.0 - k.ecc * k.ecc).sqrt() * sin_e).atan2(cos_e - k.ecc);
    let phi = v + k.omega;
    let (sin_2phi, cos_2phi) = ((2.0 * phi).sin(), (2.0 * phi).cos());

    let u = phi + k.cus * sin_2phi + k.cuc * cos_2phi;
    let r = a * (1.0 - k.ecc * cos_e) + k.crs * sin_2phi + k.crc * cos_2phi;
    let i = k.i0 + k.idot * tk + k.cis * sin_2phi + k.cic * cos_2phi;

    let xp = r * u.cos();
    let yp = r * u.sin();
    let (sin_i, cos_i) = (i.sin(), i.cos());

    if !geo {
        let omega_k = k.omega0 + (k.omega_dot - omega_e) * tk - omega_e * toe.tow();
        let (sin_o, cos_o) = (omega_k.sin(), omega_k.cos());
        Vector3::new(
            xp * cos_o - yp * cos_i * sin_o,
            xp * sin_o + yp * cos_i * cos_o,
            yp * sin_i,
        )
    } else {
        // inclined geosynchronous frame, rotated back to ECEF
        let omega_k = k.omega0 + k.omega_dot * tk - omega_e * toe.tow();
        let (sin_o, cos_o) = (omega_k.sin(), omega_k.cos());
        let xg = xp * cos_o - yp * cos_i * sin_o;
        let yg = xp * sin_o + yp * cos_i * cos_o;
        let zg = yp * sin_i;
        let (sin_w, cos_w) = ((omega_e * tk).sin(), (omega_e * tk).cos());
        Vector3::new(
            xg * cos_w + yg * sin_w * COS_N5 + zg * sin_w * SIN_N5,
            -xg * sin_w + yg * cos_w * COS_N5 + zg * cos_w * SIN_N5,
            -yg * SIN_N5 + zg * COS_N5,
        )
    }
}

/// Solve Kepler's equation by Newton iteration
fn eccentric_anomaly(m: f64, ecc: f64) -> f64 {
    let mut e = m;
    for _ in 0..10 {
        let de = (e - ecc * e.sin() - m) / (1.0 - ecc * e.cos());
        e -= de;
        if de.abs() < 1e-14 {
            break;
        }
    }
    e
}

fn wrap_half_week(mut tk: f64) -> f64 {
    if tk > 302_400.0 {
        tk -= 604_800.0;
    } else if tk < -302_400.0 {
        tk += 604_800.0;
    }
    tk
}

/// Equations of motion of the GLONASS broadcast model (PZ-90)
fn glo_deriv(x: &[f64; 6], acc: &[f64; 3]) -> [f64; 6] {
    let r2 = x[0] * x[0] + x[1] * x[1] + x[2] * x[2];
    if r2 <= 0.0 {
        return [0.0; 6];
    }
    let r3 = r2 * r2.sqrt();
    let omg2 = OMEGA_GLO * OMEGA_GLO;
    let a = 1.5 * J2_GLO * GM_GLO * RE_GLO * RE_GLO / r2 / r3;
    let b = x[2] * x[2] / r2;
    let c = -GM_GLO / r3 - a * (1.0 - 5.0 * b);
    [
        x[3],
        x[4],
        x[5],
        (c + omg2) * x[0] + 2.0 * OMEGA_GLO * x[4] + acc[0],
        (c + omg2) * x[1] - 2.0 * OMEGA_GLO * x[3] + acc[1],
        (c - 2.0 * a) * x[2] + acc[2],
    ]
}

fn glo_rk4(x: &mut [f64; 6], acc: &[f64; 3], h: f64) {
    let k1 = glo_deriv(x, acc);
    let mut w = *x;
    for i in 0..6 {
        w[i] = x[i] + k1[i] * h / 2.0;
    }
    let k2 = glo_deriv(&w, acc);
    for i in 0..6 {
        w[i] = x[i] + k2[i] * h / 2.0;
    }
    let k3 = glo_deriv(&w, acc);
    for i in 0..6 {
        w[i] = x[i] + k3[i] * h;
    }
    let k4 = glo_deriv(&w, acc);
    for i in 0..6 {
        x[i] += (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]) * h / 6.0;
    }
}

fn glo_state(t: &GpsTime, e: &GloEph) -> SatState {
    let mut dt = t.diff(&e.toc);
    let mut x = [
        e.pos[0], e.pos[1], e.pos[2], e.vel[0], e.vel[1], e.vel[2],
    ];

    let step = if dt < 0.0 { -GLO_STEP } else { GLO_STEP };
    while dt.abs() > 1e-9 {
        let h = if dt.abs() > GLO_STEP { step } else { dt };
        glo_rk4(&mut x, &e.acc, h);
        dt -= h;
    }

    let dt = t.diff(&e.toc);
    SatState {
        pos: Vector3::new(x[0], x[1], x[2]),
        vel: Vector3::new(x[3], x[4], x[5]),
        clock: -e.tau + e.gamma * dt,
    }
}

fn sbas_state(t: &GpsTime, e: &SbasEph) -> SatState {
    let dt = t.diff(&e.toc);
    let pos = Vector3::new(
        e.pos[0] + e.vel[0] * dt + 0.5 * e.acc[0] * dt * dt,
        e.pos[1] + e.vel[1] * dt + 0.5 * e.acc[1] * dt * dt,
        e.pos[2] + e.vel[2] * dt + 0.5 * e.acc[2] * dt * dt,
    );
    let vel = Vector3::new(
        e.vel[0] + e.acc[0] * dt,
        e.vel[1] + e.acc[1] * dt,
        e.vel[2] + e.acc[2] * dt,
    );
    SatState {
        pos,
        vel,
        clock: e.agf[0] + e.agf[1] * dt,
    }
}

/// Synthetic ephemerides shared by the unit tests of several modules
#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::signal::System;

    /// A healthy GPS ephemeris on a near-circular MEO orbit, semi-major axis
    /// 26560 km, orbital plane varied by PRN
    pub(crate) fn test_gps_eph(prn: u8, toc: GpsTime, iode: u32) -> Eph {
        Eph::new(BroadcastEph::Gps(GpsEph {
            prn: Prn::new(System::Gps, prn).unwrap(),
            toc,
            toe: toc,
            iode,
            health: 0,
            af: [1.0e-5, 1.0e-12, 0.0],
            kepler: KeplerParams {
                sqrt_a: 26_560_000.0_f64.sqrt(),
                ecc: 0.01,
                i0: 0.96,
                omega0: 1.0 + f64::from(prn),
                m0: 0.5 * f64::from(prn),
                omega: 0.3,
                delta_n: 4.5e-9,
                idot: 7.0e-11,
                omega_dot: -8.0e-9,
                ..KeplerParams::default()
            },
        }))
    }

    /// A successor data set for the same physical orbit, re-referenced `dt`
    /// seconds later (what a consistent broadcast update looks like)
    pub(crate) fn advance_gps_eph(eph: &Eph, dt: f64, iode: u32) -> Eph {
        let mut e = match eph.data() {
            BroadcastEph::Gps(e) => *e,
            _ => panic!("not a GPS ephemeris"),
        };
        let a = e.kepler.sqrt_a * e.kepler.sqrt_a;
        let n = (GM_GPS / (a * a * a)).sqrt() + e.kepler.delta_n;
        e.toc = e.toc + dt;
        e.toe = e.toe + dt;
        e.iode = iode;
        e.af[0] += e.af[1] * dt;
        e.kepler.m0 += n * dt;
        e.kepler.omega0 += e.kepler.omega_dot * dt;
        e.kepler.i0 += e.kepler.idot * dt;
        Eph::new(BroadcastEph::Gps(e))
    }
}
