// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Shared broadcast ephemeris store
//!
//! The store keeps, per satellite, a bounded first-in first-out queue of the
//! most recent broadcast ephemerides, tagged with the outcome of plausibility
//! checks. It is the one resource shared between a PPP client and the
//! decoders feeding it; a [`EphStore`] value is a cheap cloneable handle onto
//! the shared state, access is serialized by a single mutex and every
//! operation is short.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::corrections::{ClkCorr, OrbCorr};
use crate::signal::consts::{C_LIGHT, MAX_PRN_INDEX};
use crate::signal::{Prn, System};
use crate::time::GpsTime;

use super::{CheckState, Eph, SatState};

/// Ephemerides retained per satellite
const QUEUE_SIZE: usize = 5;

/// Minimum plausible geocentric distance of a navigation satellite, m
const MIN_RADIUS: f64 = 2.0e7;
/// Maximum plausible geocentric distance of a navigation satellite, m
const MAX_RADIUS: f64 = 6.0e7;
/// Maximum tolerated position or clock discrepancy between consecutive
/// ephemerides of one satellite, m
const MAX_CONSISTENCY_DIFF: f64 = 1000.0;

/// An error encountered when a new ephemeris is not accepted by the store
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PutError {
    /// The plausibility checks rejected the ephemeris
    #[error("ephemeris rejected, state {0:?}")]
    Rejected(CheckState),
    /// The store already holds this or a newer data set
    #[error("ephemeris is not newer than the stored one")]
    NotNewer,
}

/// An error encountered when no stored ephemeris can produce a satellite state
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("no usable ephemeris for {0}")]
pub struct NoEphemeris(pub Prn);

#[derive(Default)]
struct Inner {
    queues: Vec<VecDeque<Eph>>,
}

impl Inner {
    fn queue_mut(&mut self, prn: &Prn) -> &mut VecDeque<Eph> {
        if self.queues.is_empty() {
            self.queues.resize_with(MAX_PRN_INDEX, VecDeque::new);
        }
        &mut self.queues[prn.index()]
    }

    fn queue(&self, prn: &Prn) -> Option<&VecDeque<Eph>> {
        self.queues.get(prn.index())
    }
}

/// Handle onto a shared per-satellite ephemeris store
///
/// Clones refer to the same underlying store.
#[derive(Clone, Default)]
pub struct EphStore {
    inner: Arc<Mutex<Inner>>,
}

impl EphStore {
    /// Create a new, empty store
    #[must_use]
    pub fn new() -> EphStore {
        EphStore::default()
    }

    /// Insert a new broadcast ephemeris
    ///
    /// With `check` set the ephemeris runs through the plausibility checks
    /// first: geocentric distance at the reference time, age against `now`,
    /// and consistency against the stored data set. The ephemeris is stored
    /// when it is newer than the current entry (or there is none) and did not
    /// come out of the checks tagged bad or outdated. The oldest entry is
    /// evicted once a satellite's queue exceeds its capacity.
    ///
    /// # Errors
    ///
    /// Fails when the checks rejected the ephemeris or a same-or-newer data
    /// set is already stored.
    pub fn put(&self, mut eph: Eph, check: bool, now: &GpsTime) -> Result<(), PutError> {
        let mut inner = self.inner.lock().unwrap();
        let queue = inner.queue_mut(&eph.prn());

        if check {
            check_ephemeris(&mut eph, now, queue.back_mut());
        }

        let newer = match queue.back() {
            Some(last)
                if last.check_state() != CheckState::Bad
                    && last.check_state() != CheckState::Outdated =>
            {
                eph.is_newer_than(last)
            }
            _ => true,
        };

        let state = eph.check_state();
        if state == CheckState::Bad || state == CheckState::Outdated {
            debug!("{}: ephemeris discarded, {:?}", eph.prn(), state);
            return Err(PutError::Rejected(state));
        }
        if !newer {
            return Err(PutError::NotNewer);
        }

        queue.push_back(eph);
        if queue.len() > QUEUE_SIZE {
            queue.pop_front();
        }
        Ok(())
    }

    /// The most recent stored ephemeris for a satellite
    #[must_use]
    pub fn last(&self, prn: &Prn) -> Option<Eph> {
        let inner = self.inner.lock().unwrap();
        inner.queue(prn).and_then(|q| q.back().cloned())
    }

    /// The second most recent stored ephemeris for a satellite
    #[must_use]
    pub fn prev(&self, prn: &Prn) -> Option<Eph> {
        let inner = self.inner.lock().unwrap();
        inner
            .queue(prn)
            .and_then(|q| q.len().checked_sub(2).and_then(|i| q.get(i)).cloned())
    }

    /// The GLONASS frequency channel number of a satellite, from its most
    /// recent ephemeris
    #[must_use]
    pub fn glo_slot(&self, prn: &Prn) -> Option<i16> {
        self.last(prn).and_then(|e| e.slot())
    }

    /// Attach SSR orbit corrections to the stored ephemerides they refer to
    ///
    /// Each correction is matched by issue-of-data against the latest, then
    /// the previous ephemeris of its satellite; a match replaces any prior
    /// attachment on that ephemeris. Unmatched corrections are dropped.
    pub fn apply_orb_corrections(&self, corrections: &[OrbCorr]) {
        let mut inner = self.inner.lock().unwrap();
        for corr in corrections {
            let queue = inner.queue_mut(&corr.prn);
            let n = queue.len();
            let matched = queue
                .iter_mut()
                .rev()
                .take(2)
                .find(|e| e.iod() == corr.iod);
            match matched {
                Some(eph) => eph.set_orb_corr(*corr),
                None if n > 0 => debug!("{}: no ephemeris with IOD {}", corr.prn, corr.iod),
                None => {}
            }
        }
    }

    /// Attach SSR clock corrections to the stored ephemerides they refer to
    ///
    /// Matching works exactly like [`EphStore::apply_orb_corrections`].
    pub fn apply_clk_corrections(&self, corrections: &[ClkCorr]) {
        let mut inner = self.inner.lock().unwrap();
        for corr in corrections {
            let queue = inner.queue_mut(&corr.prn);
            let n = queue.len();
            let matched = queue
                .iter_mut()
                .rev()
                .take(2)
                .find(|e| e.iod() == corr.iod);
            match matched {
                Some(eph) => eph.set_clk_corr(*corr),
                None if n > 0 => debug!("{}: no ephemeris with IOD {}", corr.prn, corr.iod),
                None => {}
            }
        }
    }

    /// Evaluate the state of a satellite at a point in time
    ///
    /// Tries the most recent ephemeris first and falls back to the previous
    /// one, so a satellite stays usable while a fresh data set is still being
    /// validated.
    ///
    /// # Errors
    ///
    /// Fails with [`NoEphemeris`] when no stored ephemeris produces a state.
    pub fn sat_state(
        &self,
        prn: &Prn,
        t: &GpsTime,
        apply_corr: bool,
    ) -> Result<SatState, NoEphemeris> {
        // clone the entries under the lock, evaluate outside of it
        let (last, prev) = {
            let inner = self.inner.lock().unwrap();
            let queue = inner.queue(prn);
            (
                queue.and_then(|q| q.back().cloned()),
                queue.and_then(|q| q.len().checked_sub(2).and_then(|i| q.get(i)).cloned()),
            )
        };

        if let Some(eph) = last {
            if let Ok(state) = eph.state_at(t, apply_corr) {
                return Ok(state);
            }
        }
        if let Some(eph) = prev {
            if let Ok(state) = eph.state_at(t, apply_corr) {
                return Ok(state);
            }
        }
        Err(NoEphemeris(*prn))
    }

    /// Discard every stored ephemeris
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.queues.clear();
    }
}

/// Maximum tolerated age of an ephemeris per constellation, s
fn max_age(system: System) -> f64 {
    match system {
        // update interval 2 h, data sets valid for 4 hours
        System::Gps | System::Gal | System::Qzs => 4.0 * 3600.0,
        // updated every 30 minutes
        System::Glo => 3600.0,
        // updates 1 (GEO) up to 6 hours
        System::Bds => 6.0 * 3600.0,
        // maximum update interval 300 s
        System::Sbas => 600.0,
    }
}

/// Plausibility checks run on a fresh ephemeris before it enters the store
fn check_ephemeris(eph: &mut Eph, now: &GpsTime, stored: Option<&mut Eph>) {
    if eph.check_state() == CheckState::Ok || eph.check_state() == CheckState::Bad {
        return;
    }

    // satellite radial distance at the reference time
    let toc = eph.toc();
    let state = match eph.state_at(&toc, false) {
        Ok(state) => state,
        Err(_) => {
            eph.set_check_state(CheckState::Bad);
            return;
        }
    };
    let r = state.pos.norm();
    if !(MIN_RADIUS..=MAX_RADIUS).contains(&r) {
        warn!("{}: implausible orbit radius {:.0} m", eph.prn(), r);
        eph.set_check_state(CheckState::Bad);
        return;
    }

    // age against the receiver's current time
    if toc.diff(now).abs() > max_age(eph.prn().system()) {
        eph.set_check_state(CheckState::Outdated);
        return;
    }

    // consistency against the stored data set
    let stored = match stored {
        Some(stored) => stored,
        None => return,
    };
    let dt = toc.diff(&stored.toc());

    // allow a fresh start after an outage by retiring the stored entry
    if dt > max_age(eph.prn().system()) {
        stored.set_check_state(CheckState::Outdated);
        return;
    }

    if let Ok(stored_state) = stored.state_at(&toc, false) {
        let diff = (state.pos - stored_state.pos).norm();
        let diff_clk = (state.clock - stored_state.clock).abs() * C_LIGHT;

        if diff < MAX_CONSISTENCY_DIFF && diff_clk < MAX_CONSISTENCY_DIFF {
            if dt != 0.0 {
                eph.set_check_state(CheckState::Ok);
                stored.set_check_state(CheckState::Ok);
            }
        } else if stored.check_state() == CheckState::Ok {
            warn!(
                "{}: ephemeris inconsistent with stored data set ({:.0} m)",
                eph.prn(),
                diff
            );
            eph.set_check_state(CheckState::Bad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ephemeris::test_utils::{advance_gps_eph, test_gps_eph};
    use crate::ephemeris::{BroadcastEph, GpsEph, KeplerParams};

    fn now() -> GpsTime {
        GpsTime::new(2100, 345_600.0).unwrap()
    }

    fn prn(n: u8) -> Prn {
        Prn::new(System::Gps, n).unwrap()
    }

    #[test]
    fn put_and_last_prev() {
        let store = EphStore::new();
        let t = now();
        store.put(test_gps_eph(5, t, 10), false, &t).unwrap();
        store.put(test_gps_eph(5, t + 7200.0, 11), false, &t).unwrap();

        assert_eq!(store.last(&prn(5)).unwrap().iod(), 11);
        assert_eq!(store.prev(&prn(5)).unwrap().iod(), 10);
        assert!(store.last(&prn(6)).is_none());
    }

    #[test]
    fn older_data_sets_are_refused() {
        let store = EphStore::new();
        let t = now();
        store.put(test_gps_eph(5, t + 7200.0, 11), false, &t).unwrap();
        assert_eq!(
            store.put(test_gps_eph(5, t, 10), false, &t),
            Err(PutError::NotNewer)
        );
        assert_eq!(store.last(&prn(5)).unwrap().iod(), 11);
    }

    #[test]
    fn queue_is_bounded() {
        let store = EphStore::new();
        let t = now();
        for i in 0..8 {
            store
                .put(
                    test_gps_eph(5, t + 7200.0 * f64::from(i), 10 + i as u32),
                    false,
                    &t,
                )
                .unwrap();
        }
        assert_eq!(store.last(&prn(5)).unwrap().iod(), 17);
        assert_eq!(store.prev(&prn(5)).unwrap().iod(), 16);

        // the oldest entries have been evicted; re-inserting one is refused
        // as stale, not as a duplicate
        assert_eq!(
            store.put(test_gps_eph(5, t, 10), false, &t),
            Err(PutError::NotNewer)
        );
    }

    #[test]
    fn bad_radius_is_rejected_and_prior_stays() {
        let store = EphStore::new();
        let t = now();
        store.put(test_gps_eph(5, t, 10), true, &t).unwrap();

        // an orbit at 1e8 m geocentric distance
        let rogue = Eph::new(BroadcastEph::Gps(GpsEph {
            prn: prn(5),
            toc: t + 60.0,
            toe: t + 60.0,
            iode: 11,
            health: 0,
            af: [0.0; 3],
            kepler: KeplerParams {
                sqrt_a: 1.0e8_f64.sqrt(),
                ecc: 0.0,
                i0: 0.9,
                ..KeplerParams::default()
            },
        }));
        assert_eq!(
            store.put(rogue, true, &t),
            Err(PutError::Rejected(CheckState::Bad))
        );

        // the evaluator keeps answering from the prior data set
        assert_eq!(store.last(&prn(5)).unwrap().iod(), 10);
        assert!(store.sat_state(&prn(5), &t, false).is_ok());
    }

    #[test]
    fn age_gate_is_inclusive() {
        let t = now();

        // age exactly at the limit passes
        let store = EphStore::new();
        let at_limit = t + 4.0 * 3600.0;
        store.put(test_gps_eph(5, at_limit, 10), true, &t).unwrap();
        assert!(store.last(&prn(5)).is_some());

        // one tick past the limit is outdated
        let store = EphStore::new();
        let past_limit = t + 4.0 * 3600.0 + 1.0;
        assert_eq!(
            store.put(test_gps_eph(5, past_limit, 10), true, &t),
            Err(PutError::Rejected(CheckState::Outdated))
        );
    }

    #[test]
    fn consistent_pair_is_promoted() {
        let store = EphStore::new();
        let t = now();
        let first = test_gps_eph(5, t, 10);
        let second = advance_gps_eph(&first, 7200.0, 11);
        store.put(first, true, &t).unwrap();
        store.put(second, true, &(t + 7200.0)).unwrap();

        assert_eq!(store.last(&prn(5)).unwrap().check_state(), CheckState::Ok);
        assert_eq!(store.prev(&prn(5)).unwrap().check_state(), CheckState::Ok);
    }

    #[test]
    fn inconsistent_successor_is_rejected() {
        let store = EphStore::new();
        let t = now();
        let first = test_gps_eph(5, t, 10);
        let second = advance_gps_eph(&first, 7200.0, 11);
        store.put(first, true, &t).unwrap();
        store.put(second, true, &(t + 7200.0)).unwrap();

        // same satellite on a completely different orbital plane
        let mut other = match *test_gps_eph(6, t + 7260.0, 12).data() {
            BroadcastEph::Gps(e) => e,
            _ => unreachable!(),
        };
        other.prn = prn(5);
        let rogue = Eph::new(BroadcastEph::Gps(other));
        assert_eq!(
            store.put(rogue, true, &(t + 7260.0)),
            Err(PutError::Rejected(CheckState::Bad))
        );
        assert_eq!(store.last(&prn(5)).unwrap().iod(), 11);
    }

    #[test]
    fn corrections_attach_by_iod() {
        let store = EphStore::new();
        let t = now();
        store.put(test_gps_eph(5, t, 10), false, &t).unwrap();
        store.put(test_gps_eph(5, t + 7200.0, 11), false, &t).unwrap();

        // matches the previous entry, not the latest
        store.apply_orb_corrections(&[OrbCorr {
            prn: prn(5),
            iod: 10,
            time: t,
            rac: [1.0, 0.0, 0.0],
            dot_rac: [0.0; 3],
        }]);

        let last = store.last(&prn(5)).unwrap();
        let prev = store.prev(&prn(5)).unwrap();
        assert_eq!(
            last.state_at(&t, true).unwrap(),
            last.state_at(&t, false).unwrap()
        );
        assert_ne!(
            prev.state_at(&t, true).unwrap().pos,
            prev.state_at(&t, false).unwrap().pos
        );
    }

    #[test]
    fn evaluator_falls_back_to_prev() {
        let store = EphStore::new();
        let t = now();
        store.put(test_gps_eph(5, t, 10), false, &t).unwrap();

        // an unhealthy latest entry cannot be evaluated
        let mut sick = match *test_gps_eph(5, t + 7200.0, 11).data() {
            BroadcastEph::Gps(e) => e,
            _ => unreachable!(),
        };
        sick.health = 63;
        store
            .put(Eph::new(BroadcastEph::Gps(sick)), false, &t)
            .unwrap();

        let state = store.sat_state(&prn(5), &t, false).unwrap();
        let from_prev = store.prev(&prn(5)).unwrap().state_at(&t, false).unwrap();
        assert_eq!(state, from_prev);

        assert!(store.sat_state(&prn(7), &t, false).is_err());
        store.clear();
        assert!(store.sat_state(&prn(5), &t, false).is_err());
    }
}
