// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! RTCM2 message extraction
//!
//! Decoders for the legacy differential messages the engine consumes:
//! reference station parameters (3, 22, 24), antenna descriptors (23),
//! undifferenced carrier phase and pseudorange (18, 19) and the
//! high-resolution carrier/range corrections (20, 21).
//!
//! The observation decoders carry several workarounds for receiver behavior
//! seen in deployed networks: measurement epochs are rounded to 10 ms, the
//! carrier phase ambiguity window is 2^23 cycles rather than the documented
//! 2^24, and the constellation flag of pseudorange messages is decided by a
//! majority vote because one receiver family mislabels GPS PRN 32 as
//! GLONASS.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::signal::consts::{GPS_L1_WAVELENGTH, GPS_L2_WAVELENGTH};
use crate::time::GpsTime;

use super::packet::{Packet, PacketTooShort};

/// Carrier phase ambiguity window, cycles
///
/// The standard specifies 2^24 but numerous receivers generate data in the
/// +/-2^22 cycle range; a window of 2^23 cycles is compatible with both.
const PHASE_AMBIG_CYCLES: f64 = 8_388_608.0; // 2^23

/// Stand-in for a correction that decoded to exactly zero, so presence
/// checks against 0.0 keep working
const ZERO_VALUE: f64 = 1e-100;

/// Message availability flags for an 18/19 observation block
const AVAIL_L1_RNG_GPS: u8 = 1 << 0;
const AVAIL_L2_RNG_GPS: u8 = 1 << 1;
const AVAIL_L1_CPH_GPS: u8 = 1 << 2;
const AVAIL_L2_CPH_GPS: u8 = 1 << 3;
const AVAIL_L1_RNG_GLO: u8 = 1 << 4;
const AVAIL_L2_RNG_GLO: u8 = 1 << 5;
const AVAIL_L1_CPH_GLO: u8 = 1 << 6;
const AVAIL_L2_CPH_GLO: u8 = 1 << 7;

/// GLONASS satellites are carried with this offset on their block PRN
pub(crate) const GLONASS_PRN_OFFSET: u32 = 200;

/// Measurement epoch of an 18/19/20/21 packet: seconds into the hour from
/// the modified Z-count plus the microsecond field
fn packet_hour_secs(p: &Packet) -> Result<f64, PacketTooShort> {
    Ok(0.6 * f64::from(p.mod_z_count()) + f64::from(p.get_unsigned_bits(4, 20)?) * 1.0e-6)
}

/// Round an epoch to integer hundredths of a second
///
/// Receivers are assumed to measure at hard edges of their clock with
/// minimum divisions of 10 ms; various deployed receivers disagree on how
/// the epoch field is meant to be filled below that.
fn round_epoch(t: f64) -> f64 {
    (t * 100.0 + 0.5).floor() / 100.0
}

/// Reference station ECEF coordinates (message 3)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Msg03 {
    pub valid: bool,
    /// Antenna reference point, m
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Msg03 {
    pub fn extract(&mut self, p: &Packet) {
        if p.msg_type() != 3 || p.n_data_words() != 4 {
            return;
        }
        let _ = self.try_extract(p);
    }

    fn try_extract(&mut self, p: &Packet) -> Result<(), PacketTooShort> {
        let x = f64::from(p.get_bits(0, 32)?) * 0.01;
        let y = f64::from(p.get_bits(32, 32)?) * 0.01;
        let z = f64::from(p.get_bits(64, 32)?) * 0.01;
        self.x = x;
        self.y = y;
        self.z = z;
        self.valid = true;
        Ok(())
    }
}

/// Antenna L1 eccentricities (message 22)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Msg22 {
    pub valid: bool,
    /// L1 phase center offset from the reference point, m
    pub d_l1: [f64; 3],
    /// L2 offset, not broadcast in the legacy layout
    pub d_l2: [f64; 3],
}

impl Msg22 {
    pub fn extract(&mut self, p: &Packet) {
        if p.msg_type() != 22 {
            return;
        }
        let _ = self.try_extract(p);
    }

    fn try_extract(&mut self, p: &Packet) -> Result<(), PacketTooShort> {
        const D_L1_UNIT: f64 = 0.01 / 256.0;
        let dx = f64::from(p.get_bits(0, 8)?) * D_L1_UNIT;
        let dy = f64::from(p.get_bits(8, 8)?) * D_L1_UNIT;
        let dz = f64::from(p.get_bits(16, 8)?) * D_L1_UNIT;
        self.d_l1 = [dx, dy, dz];
        self.d_l2 = [0.0; 3];
        self.valid = true;
        Ok(())
    }
}

/// Antenna type and serial number (message 23)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Msg23 {
    pub valid: bool,
    /// Antenna descriptor
    pub ant_type: String,
    /// Antenna serial number
    pub ant_sn: String,
}

impl Msg23 {
    pub fn extract(&mut self, p: &Packet) {
        if p.msg_type() != 23 || p.n_data_words() < 1 {
            return;
        }
        let _ = self.try_extract(p);
    }

    fn try_extract(&mut self, p: &Packet) -> Result<(), PacketTooShort> {
        // bits in the first field: reserved, AF, SF, NAD
        const N_F1: usize = 8;
        // bits in the second field: setup id, reserved, NAS
        const N_F2: usize = 16;

        let nad = p.get_unsigned_bits(3, 5)? as usize;
        let mut ant_type = String::new();
        for i in 0..nad {
            ant_type.push(p.get_unsigned_bits(N_F1 + i * 8, 8)? as u8 as char);
        }

        let mut ant_sn = String::new();
        if p.get_unsigned_bits(2, 1)? == 1 {
            let nas = p.get_unsigned_bits(19 + 8 * nad, 5)? as usize;
            for i in 0..nas {
                ant_sn.push(p.get_unsigned_bits(N_F1 + 8 * nad + N_F2 + i * 8, 8)? as u8 as char);
            }
        }

        self.ant_type = ant_type;
        self.ant_sn = ant_sn;
        self.valid = true;
        Ok(())
    }
}

/// Reference station antenna reference point (message 24)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Msg24 {
    pub valid: bool,
    pub is_gps: bool,
    pub is_glonass: bool,
    /// Antenna reference point, m
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Antenna height, m
    pub h: f64,
}

impl Msg24 {
    pub fn extract(&mut self, p: &Packet) {
        if p.msg_type() != 24 || p.n_data_words() != 6 {
            return;
        }
        let _ = self.try_extract(p);
    }

    fn try_extract(&mut self, p: &Packet) -> Result<(), PacketTooShort> {
        let gnss = p.get_unsigned_bits(118, 1)?;

        // 64 mm scaled base with a sign-matched decimeter sub-resolution add-on
        let x = 64.0 * f64::from(p.get_bits(0, 32)?);
        let y = 64.0 * f64::from(p.get_bits(40, 32)?);
        let z = 64.0 * f64::from(p.get_bits(80, 32)?);
        let dx = f64::from(p.get_unsigned_bits(32, 6)?);
        let dy = f64::from(p.get_unsigned_bits(72, 6)?);
        let dz = f64::from(p.get_unsigned_bits(112, 6)?);

        self.is_gps = gnss == 0;
        self.is_glonass = gnss == 1;
        self.x = 0.0001 * (x + if x < 0.0 { -dx } else { dx });
        self.y = 0.0001 * (y + if y < 0.0 { -dy } else { dy });
        self.z = 0.0001 * (z + if z < 0.0 { -dz } else { dz });

        if p.get_unsigned_bits(119, 1)? == 1 {
            self.h = f64::from(p.get_unsigned_bits(120, 18)?) * 0.0001;
        }

        self.valid = true;
        Ok(())
    }
}

/// Per-satellite measurements accumulated from an 18/19 block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockSat {
    /// GPS PRN, or GLONASS slot number plus [`GLONASS_PRN_OFFSET`]
    pub prn: u32,
    /// C/A code pseudorange on L1, m
    pub rng_c1: f64,
    /// P(Y) code pseudorange on L1, m
    pub rng_p1: f64,
    /// Pseudorange on L2, m
    pub rng_p2: f64,
    /// Carrier phase on L1, cycles, truncated to the ambiguity window
    pub cph_l1: f64,
    /// Carrier phase on L2, cycles, truncated to the ambiguity window
    pub cph_l2: f64,
    /// Carrier phase slip counters, -1 while unseen
    pub slip_l1: i32,
    pub slip_l2: i32,
}

/// A block of 18 & 19 packets combined into a complete set of measurements
///
/// The multiple message indicator is inconsistently handled by various
/// receivers, so completeness is instead defined as code and phase on both
/// L1 and L2 for GPS. GLONASS observations are optional, but must be
/// complete as well if any appear, and the GLONASS message must follow the
/// corresponding GPS message.
#[derive(Debug, Clone, Default)]
pub struct ObsBlock {
    /// Seconds of hour (GPS time)
    pub secs: f64,
    /// Satellites collected so far
    pub sats: Vec<BlockSat>,
    gps_only: bool,
    avail: u8,
}

impl ObsBlock {
    #[must_use]
    pub fn new() -> ObsBlock {
        let mut block = ObsBlock::default();
        block.clear();
        block
    }

    /// Reset the entire block
    pub fn clear(&mut self) {
        self.gps_only = true;
        self.secs = 0.0;
        self.sats.clear();
        self.avail = 0;
    }

    fn any_gps(&self) -> bool {
        self.avail & (AVAIL_L1_RNG_GPS | AVAIL_L2_RNG_GPS | AVAIL_L1_CPH_GPS | AVAIL_L2_CPH_GPS)
            != 0
    }

    fn all_gps(&self) -> bool {
        let all = AVAIL_L1_RNG_GPS | AVAIL_L2_RNG_GPS | AVAIL_L1_CPH_GPS | AVAIL_L2_CPH_GPS;
        self.avail & all == all
    }

    fn all_glonass(&self) -> bool {
        let all = AVAIL_L1_RNG_GLO | AVAIL_L2_RNG_GLO | AVAIL_L1_CPH_GLO | AVAIL_L2_CPH_GLO;
        self.avail & all == all
    }

    /// Check for a complete observation block
    #[must_use]
    pub fn valid(&self) -> bool {
        self.all_gps() && (self.gps_only || self.all_glonass())
    }

    fn sat_index(&mut self, prn: u32) -> usize {
        if let Some(i) = self.sats.iter().position(|s| s.prn == prn) {
            return i;
        }
        self.sats.push(BlockSat {
            prn,
            slip_l1: -1,
            slip_l2: -1,
            ..BlockSat::default()
        });
        self.sats.len() - 1
    }

    /// Extract an 18 or 19 packet and store its measurements for later use
    pub fn extract(&mut self, p: &Packet) {
        if p.msg_type() != 18 && p.msg_type() != 19 {
            return;
        }
        // one data word for the epoch, two per satellite
        if p.n_data_words() < 3 || p.n_data_words() % 2 == 0 {
            trace!(
                "observation packet with bad word count {}, dropped",
                p.n_data_words()
            );
            return;
        }

        // clear previous data if the block was already complete
        if self.valid() {
            self.clear();
        }

        let _ = self.try_extract(p);
    }

    fn try_extract(&mut self, p: &Packet) -> Result<(), PacketTooShort> {
        let n_sat = (p.n_data_words() - 1) / 2;
        let t = round_epoch(packet_hour_secs(p)?);

        // frequency, exit if neither L1 nor L2
        let is_l1 = p.get_unsigned_bits(0, 1)? == 0;
        if p.get_unsigned_bits(1, 1)? == 1 {
            return Ok(());
        }

        let is_gps = if p.msg_type() == 19 {
            // Majority vote across the satellites in the packet. GPS PRN 32
            // is erroneously flagged as GLONASS in the C/A pseudorange
            // messages of one receiver family; the vote overrides the
            // leading satellite's constellation flag.
            let mut n_gps = 0;
            for i_sat in 0..n_sat {
                if p.get_unsigned_bits(i_sat * 48 + 26, 1)? == 0 {
                    n_gps += 1;
                }
            }
            2 * n_gps > n_sat
        } else {
            p.get_unsigned_bits(26, 1)? == 0
        };
        self.gps_only = self.gps_only && is_gps;

        // Store the epoch of the first GPS message and check consistency of
        // subsequent ones. GLONASS time tags are different and are ignored.
        if is_gps {
            if self.sats.is_empty() {
                self.secs = t;
            } else if (t - self.secs).abs() > 1e-6 {
                self.clear();
                self.secs = t;
            }
        }

        // discard GLONASS observations when no prior GPS observations exist
        if !is_gps && !self.any_gps() {
            return Ok(());
        }

        self.avail |= match (p.msg_type(), is_l1, is_gps) {
            (18, true, true) => AVAIL_L1_CPH_GPS,
            (18, false, true) => AVAIL_L2_CPH_GPS,
            (18, true, false) => AVAIL_L1_CPH_GLO,
            (18, false, false) => AVAIL_L2_CPH_GLO,
            (_, true, true) => AVAIL_L1_RNG_GPS,
            (_, false, true) => AVAIL_L2_RNG_GPS,
            (_, true, false) => AVAIL_L1_RNG_GLO,
            (_, false, false) => AVAIL_L2_RNG_GLO,
        };

        for i_sat in 0..n_sat {
            let is_ca_code = p.get_unsigned_bits(i_sat * 48 + 25, 1)? == 0;
            let mut sid = p.get_unsigned_bits(i_sat * 48 + 27, 5)?;
            if sid == 0 {
                sid = 32;
            }
            let prn = if is_gps { sid } else { sid + GLONASS_PRN_OFFSET };

            if p.msg_type() == 18 {
                // carrier phase, mod 2^23 cycles, sign matched to range
                let cph = -f64::from(p.get_bits(i_sat * 48 + 40, 32)?) / 256.0;
                let slip_cnt = p.get_unsigned_bits(i_sat * 48 + 35, 5)? as i32;

                let idx = self.sat_index(prn);
                if is_l1 {
                    self.sats[idx].cph_l1 = cph;
                    self.sats[idx].slip_l1 = slip_cnt;
                } else {
                    self.sats[idx].cph_l2 = cph;
                    self.sats[idx].slip_l2 = slip_cnt;
                }
            } else {
                let rng = f64::from(p.get_unsigned_bits(i_sat * 48 + 40, 32)?) * 0.02;

                let idx = self.sat_index(prn);
                if is_l1 {
                    if is_ca_code {
                        self.sats[idx].rng_c1 = rng;
                    } else {
                        self.sats[idx].rng_p1 = rng;
                    }
                } else {
                    self.sats[idx].rng_p2 = rng;
                }
            }
        }

        Ok(())
    }

    /// L1 carrier phase of the i-th satellite with the truncation ambiguity
    /// resolved against the pseudorange, cycles
    #[must_use]
    pub fn resolved_phase_l1(&self, i: usize) -> f64 {
        self.resolved_phase(i, GPS_L1_WAVELENGTH, |s| s.cph_l1)
    }

    /// L2 carrier phase of the i-th satellite with the truncation ambiguity
    /// resolved against the pseudorange, cycles
    #[must_use]
    pub fn resolved_phase_l2(&self, i: usize) -> f64 {
        self.resolved_phase(i, GPS_L2_WAVELENGTH, |s| s.cph_l2)
    }

    fn resolved_phase(&self, i: usize, lambda: f64, phase: impl Fn(&BlockSat) -> f64) -> f64 {
        if !self.valid() || i >= self.sats.len() {
            return 0.0;
        }
        let sat = &self.sats[i];
        let mut rng = sat.rng_c1;
        if rng == 0.0 {
            rng = sat.rng_p1;
        }
        if rng == 0.0 {
            return 0.0;
        }
        let cph = phase(sat);
        let n = ((rng / lambda - cph) / PHASE_AMBIG_CYCLES + 0.5).floor();
        cph + n * PHASE_AMBIG_CYCLES
    }

    /// Resolve the truncated hour-of-week epoch against a full reference time
    #[must_use]
    pub fn resolve_epoch(&self, reference: &GpsTime) -> GpsTime {
        resolve_hour_epoch(self.secs, reference)
    }
}

/// Resolve an hour-truncated epoch against a full reference time, picking
/// the hour that puts the epoch closest to the reference
#[must_use]
pub(crate) fn resolve_hour_epoch(secs: f64, reference: &GpsTime) -> GpsTime {
    let tow = secs + 3600.0 * ((reference.tow() - secs) / 3600.0 + 0.5).floor();
    GpsTime::new_unchecked(reference.wn(), tow) + 0.0
}

/// High-resolution carrier and range corrections for one satellite,
/// accumulated from 20/21 packets
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HiResCorr {
    pub prn: u32,
    /// Seconds of hour of the current epoch
    pub tt: f64,
    /// L1/L2 carrier corrections, cycles
    pub phase1: f64,
    pub phase2: f64,
    /// Loss-of-lock counters; survive an epoch reset
    pub lock1: u32,
    pub lock2: u32,
    /// Lock counter changed this epoch
    pub slip1: bool,
    pub slip2: bool,
    pub iod_p1: u32,
    pub iod_p2: u32,
    /// L1/L2 range corrections, m
    pub range1: f64,
    pub range2: f64,
    pub drange1: f64,
    pub drange2: f64,
    /// P-code (rather than C/A) indicator
    pub p_ind1: bool,
    pub p_ind2: bool,
    pub iod_r1: u32,
    pub iod_r2: u32,
}

impl HiResCorr {
    /// Reset the epoch data but keep the lock counters and PRN
    fn reset(&mut self) {
        self.tt = 0.0;
        self.phase1 = 0.0;
        self.phase2 = 0.0;
        self.slip1 = false;
        self.slip2 = false;
        self.iod_p1 = 0;
        self.iod_p2 = 0;
        self.range1 = 0.0;
        self.range2 = 0.0;
        self.drange1 = 0.0;
        self.drange2 = 0.0;
        self.iod_r1 = 0;
        self.iod_r2 = 0;
        self.p_ind1 = false;
        self.p_ind2 = false;
    }
}

/// Accumulator for 20/21 packets of one epoch
///
/// Records pile up until every satellite has its multiple message indicator
/// cleared; the frozen set is then exposed until the next epoch starts.
#[derive(Debug, Clone, Default)]
pub struct HiResCorrSet {
    tt: f64,
    valid: bool,
    entries: BTreeMap<u32, HiResCorr>,
    current: BTreeSet<u32>,
}

impl HiResCorrSet {
    #[must_use]
    pub fn new() -> HiResCorrSet {
        HiResCorrSet::default()
    }

    /// Seconds of hour of the accumulated epoch
    #[must_use]
    pub fn hour_secs(&self) -> f64 {
        self.tt
    }

    /// Whether a complete epoch has been frozen
    #[must_use]
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Iterate over the satellites present in the frozen epoch
    pub fn iter(&self) -> impl Iterator<Item = &HiResCorr> + '_ {
        self.current.iter().filter_map(move |prn| self.entries.get(prn))
    }

    /// Reset the epoch; lock counters survive for slip detection
    pub fn clear(&mut self) {
        self.tt = 0.0;
        self.valid = false;
        for corr in self.entries.values_mut() {
            corr.reset();
        }
        self.current.clear();
    }

    /// Extract a 20 or 21 packet
    pub fn extract(&mut self, p: &Packet) {
        if p.msg_type() != 20 && p.msg_type() != 21 {
            return;
        }
        if p.n_data_words() < 5 || p.n_data_words() % 2 == 0 {
            trace!(
                "correction packet with bad word count {}, dropped",
                p.n_data_words()
            );
            return;
        }
        let _ = self.try_extract(p);
    }

    fn try_extract(&mut self, p: &Packet) -> Result<(), PacketTooShort> {
        let tt = packet_hour_secs(p)?;

        // a new epoch or a frozen set starts over
        if tt != self.tt || self.valid {
            self.clear();
            self.tt = tt;
        }

        let is_l1 = p.get_unsigned_bits(0, 1)? == 0;
        if p.get_unsigned_bits(1, 1)? == 1 {
            return Ok(());
        }

        let n_sat = (p.n_data_words() - 1) / 2;
        let mut multiple_msg = true;

        for i_sat in 0..n_sat {
            let mult = p.get_bits(i_sat * 48 + 24, 1)? != 0;
            let is_gps = p.get_unsigned_bits(i_sat * 48 + 26, 1)? == 0;
            let mut prn = p.get_unsigned_bits(i_sat * 48 + 27, 5)?;

            multiple_msg = multiple_msg && mult;

            if !is_gps {
                prn += GLONASS_PRN_OFFSET;
            }
            if prn == 0 {
                prn = 32;
            }

            let corr = self.entries.entry(prn).or_default();
            self.current.insert(prn);
            corr.prn = prn;
            corr.tt = tt;

            if p.msg_type() == 20 {
                let loss_lock = p.get_unsigned_bits(i_sat * 48 + 35, 5)?;
                let iod = p.get_unsigned_bits(i_sat * 48 + 40, 8)?;
                let corr_val = f64::from(p.get_bits(i_sat * 48 + 48, 24)?) / 256.0;
                let stored = if corr_val != 0.0 { corr_val } else { ZERO_VALUE };

                if is_l1 {
                    corr.phase1 = stored;
                    corr.slip1 = corr.lock1 != loss_lock;
                    corr.lock1 = loss_lock;
                    corr.iod_p1 = iod;
                } else {
                    corr.phase2 = stored;
                    corr.slip2 = corr.lock2 != loss_lock;
                    corr.lock2 = loss_lock;
                    corr.iod_p2 = iod;
                }
            } else {
                let p_ca_ind = p.get_bits(i_sat * 48 + 25, 1)? != 0;
                let dcorr_unit = if p.get_unsigned_bits(i_sat * 48 + 32, 1)? != 0 {
                    0.032
                } else {
                    0.002
                };
                let corr_unit = if p.get_unsigned_bits(i_sat * 48 + 36, 1)? != 0 {
                    0.320
                } else {
                    0.020
                };
                let iod = p.get_unsigned_bits(i_sat * 48 + 40, 8)?;
                let corr_val = f64::from(p.get_bits(i_sat * 48 + 48, 16)?) * corr_unit;
                let dcorr_val = f64::from(p.get_bits(i_sat * 48 + 64, 8)?) * dcorr_unit;
                let stored = if corr_val != 0.0 { corr_val } else { ZERO_VALUE };

                if is_l1 {
                    corr.range1 = stored;
                    corr.drange1 = dcorr_val;
                    corr.iod_r1 = iod;
                    corr.p_ind1 = p_ca_ind;
                } else {
                    corr.range2 = stored;
                    corr.drange2 = dcorr_val;
                    corr.iod_r2 = iod;
                    corr.p_ind2 = p_ca_ind;
                }
            }
        }

        self.valid = !multiple_msg;
        Ok(())
    }
}
