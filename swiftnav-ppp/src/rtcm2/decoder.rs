// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! RTCM2 stream decoding
//!
//! Turns a raw byte stream into observation and station records. Observation
//! blocks (messages 18/19) emit once complete; high-resolution corrections
//! (20/21) are translated into synthetic observations using the reference
//! station coordinates and matching broadcast ephemerides from the shared
//! store; station messages (3, 22, 23, 24) accumulate into the exposed
//! station records.
//!
//! The wire format truncates epochs to the hour, so every decode call takes
//! the receiver's current GPS time as a reference to resolve full epochs.

use log::{debug, warn};

use crate::coords::{ECEF, OMEGA_EARTH};
use crate::ephemeris::{Eph, EphStore};
use crate::obs::{FrqObs, SatObs};
use crate::signal::consts::{C_LIGHT, GPS_L1_WAVELENGTH, GPS_L2_WAVELENGTH};
use crate::signal::{Prn, System};
use crate::time::GpsTime;

use super::msg::{
    resolve_hour_epoch, HiResCorrSet, Msg03, Msg22, Msg23, Msg24, ObsBlock, GLONASS_PRN_OFFSET,
};
use super::packet::PacketAssembler;

/// Which station point a coordinate record refers to
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RefPointKind {
    /// Antenna phase center (message 3, refined by 22)
    PhaseCenter,
    /// Antenna reference point (message 24)
    ReferencePoint,
}

/// A reference station coordinate record decoded from the stream
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StationRecord {
    pub kind: RefPointKind,
    /// Message type the record came from
    pub msg_type: u16,
    pub ecef: ECEF,
    /// Antenna height above the reference point, when broadcast
    pub height: Option<f64>,
}

/// Decoder for one RTCM2 byte stream
pub struct Rtcm2Decoder {
    buffer: Vec<u8>,
    assembler: PacketAssembler,
    obs_block: ObsBlock,
    corr_set: HiResCorrSet,
    msg03: Msg03,
    msg22: Msg22,
    msg23: Msg23,
    msg24: Msg24,
    store: EphStore,
    stations: Vec<StationRecord>,
}

impl Rtcm2Decoder {
    /// A decoder drawing ephemerides from the given shared store
    #[must_use]
    pub fn new(store: EphStore) -> Rtcm2Decoder {
        Rtcm2Decoder {
            buffer: Vec::new(),
            assembler: PacketAssembler::new(),
            obs_block: ObsBlock::new(),
            corr_set: HiResCorrSet::new(),
            msg03: Msg03::default(),
            msg22: Msg22::default(),
            msg23: Msg23::default(),
            msg24: Msg24::default(),
            store,
            stations: Vec::new(),
        }
    }

    /// Reference station antenna phase center, message 3 refined by the
    /// message 22 L1 eccentricities
    #[must_use]
    pub fn station_coordinates(&self) -> Option<ECEF> {
        if !self.msg03.valid {
            return None;
        }
        let d = if self.msg22.valid {
            self.msg22.d_l1
        } else {
            [0.0; 3]
        };
        Some(ECEF::new(
            self.msg03.x + d[0],
            self.msg03.y + d[1],
            self.msg03.z + d[2],
        ))
    }

    /// Antenna descriptor and serial number from message 23
    #[must_use]
    pub fn antenna(&self) -> Option<(&str, &str)> {
        if self.msg23.valid {
            Some((&self.msg23.ant_type, &self.msg23.ant_sn))
        } else {
            None
        }
    }

    /// Station coordinate records decoded so far, oldest first
    #[must_use]
    pub fn stations(&self) -> &[StationRecord] {
        &self.stations
    }

    /// Feed stream bytes and collect the observations that completed
    ///
    /// `now` is the receiver's current GPS time, used to resolve the
    /// hour-truncated epoch fields. Framing and parity problems resolve
    /// internally by resynchronization and are never surfaced.
    pub fn decode(&mut self, data: &[u8], now: &GpsTime) -> Vec<SatObs> {
        self.buffer.extend_from_slice(data);

        let mut out = Vec::new();
        while let Some(packet) = self.assembler.next_packet(&mut self.buffer) {
            match packet.msg_type() {
                18 | 19 => {
                    self.obs_block.extract(&packet);
                    if self.obs_block.valid() {
                        self.emit_obs_block(now, &mut out);
                        self.obs_block.clear();
                    }
                }
                20 | 21 => {
                    self.corr_set.extract(&packet);
                    if self.corr_set.valid() {
                        self.translate_corrections(now, &mut out);
                    }
                }
                3 => {
                    self.msg03.extract(&packet);
                    if self.msg03.valid {
                        if let Some(ecef) = self.station_coordinates() {
                            self.stations.push(StationRecord {
                                kind: RefPointKind::PhaseCenter,
                                msg_type: 3,
                                ecef,
                                height: None,
                            });
                        }
                    }
                }
                22 => self.msg22.extract(&packet),
                23 => self.msg23.extract(&packet),
                24 => {
                    self.msg24.extract(&packet);
                    if self.msg24.valid {
                        self.stations.push(StationRecord {
                            kind: RefPointKind::ReferencePoint,
                            msg_type: 24,
                            ecef: ECEF::new(self.msg24.x, self.msg24.y, self.msg24.z),
                            height: Some(self.msg24.h),
                        });
                    }
                }
                other => debug!("unhandled RTCM2 message type {}", other),
            }
        }
        out
    }

    /// Turn a complete 18/19 block into per-satellite observations
    fn emit_obs_block(&mut self, now: &GpsTime, out: &mut Vec<SatObs>) {
        let epoch = self.obs_block.resolve_epoch(now);

        for (i, sat) in self.obs_block.sats.iter().enumerate() {
            let prn = if sat.prn > GLONASS_PRN_OFFSET / 2 {
                Prn::new(System::Glo, (sat.prn % 100) as u8)
            } else {
                Prn::new(System::Gps, sat.prn as u8)
            };
            let prn = match prn {
                Ok(prn) => prn,
                Err(_) => {
                    warn!("observation block with invalid satellite {}", sat.prn);
                    continue;
                }
            };
            let sys = prn.system();

            let mut obs_1c = FrqObs::new("1C");
            obs_1c.code_valid = true;
            obs_1c.code = sat.rng_c1;

            let mut obs_1p = FrqObs::new(if sys == System::Gps { "1W" } else { "1P" });
            obs_1p.code_valid = true;
            obs_1p.code = sat.rng_p1;
            obs_1p.phase_valid = true;
            obs_1p.phase = self.obs_block.resolved_phase_l1(i);
            // the wire slip counter counts the other way round from what the
            // conditioning expects, mark it unknown instead
            obs_1p.slip_counter = -1;

            let mut obs_2p = FrqObs::new(if sys == System::Gps { "2W" } else { "2P" });
            obs_2p.code_valid = true;
            obs_2p.code = sat.rng_p2;
            obs_2p.phase_valid = true;
            obs_2p.phase = self.obs_block.resolved_phase_l2(i);
            obs_2p.slip_counter = -1;

            out.push(SatObs {
                prn,
                time: epoch,
                obs: vec![obs_1c, obs_1p, obs_2p],
            });
        }
    }

    /// Translate a frozen 20/21 correction epoch into synthetic observations
    ///
    /// The observation is reconstructed as geometric range minus broadcast
    /// correction, plus the receiver clock reading implied by rounding the
    /// measurement epoch to the receiver's 10 ms grid.
    fn translate_corrections(&mut self, now: &GpsTime, out: &mut Vec<SatObs>) {
        if !self.msg03.valid {
            return;
        }
        let station = match self.station_coordinates() {
            Some(ecef) => ecef,
            None => return,
        };

        let hoursec_est = self.corr_set.hour_secs();
        let hoursec_rcv = (hoursec_est * 100.0).round() / 100.0;
        let rcv_clk_bias = (hoursec_est - hoursec_rcv) * C_LIGHT;

        let epoch_est = resolve_hour_epoch(hoursec_est, now);
        let epoch_rcv = resolve_hour_epoch(hoursec_rcv, now);

        for corr in self.corr_set.iter() {
            // GLONASS high-resolution corrections are not translated
            if corr.prn >= GLONASS_PRN_OFFSET {
                continue;
            }
            let prn = match Prn::new(System::Gps, corr.prn as u8) {
                Ok(prn) => prn,
                Err(_) => continue,
            };

            let mut obs_1c = FrqObs::new("1C");
            let mut obs_1p = FrqObs::new("1W");
            let mut obs_2p = FrqObs::new("2W");
            let mut missing_iods = Vec::new();
            let mut any = false;

            let items = [
                (corr.iod_p1, corr.phase1 * GPS_L1_WAVELENGTH, "L1"),
                (corr.iod_p2, corr.phase2 * GPS_L2_WAVELENGTH, "L2"),
                (corr.iod_r1, corr.range1, "P1"),
                (corr.iod_r2, corr.range2, "P2"),
            ];
            for (ii, (iod_corr, corr_val, label)) in items.iter().enumerate() {
                let eph = self.select_eph(&prn, *iod_corr);
                let eph = match eph {
                    Some(eph) => eph,
                    None => {
                        if *iod_corr != 0 {
                            missing_iods.push(format!("{}:{}", label, iod_corr));
                        }
                        continue;
                    }
                };

                let (rho, clk_sat_m) = match geometric_range(&eph, &station, &epoch_est) {
                    Some(v) => v,
                    None => continue,
                };

                let mut obs_val = rho - corr_val + rcv_clk_bias - clk_sat_m;
                if obs_val == 0.0 {
                    obs_val = 1e-100;
                }
                any = true;

                match ii {
                    0 => {
                        obs_1p.phase_valid = true;
                        obs_1p.phase = obs_val / GPS_L1_WAVELENGTH;
                        obs_1p.slip_counter = -1;
                    }
                    1 => {
                        obs_2p.phase_valid = true;
                        obs_2p.phase = obs_val / GPS_L2_WAVELENGTH;
                        obs_2p.slip_counter = -1;
                    }
                    2 => {
                        if corr.p_ind1 {
                            obs_1p.code_valid = true;
                            obs_1p.code = obs_val;
                        } else {
                            obs_1c.code_valid = true;
                            obs_1c.code = obs_val;
                        }
                    }
                    _ => {
                        if corr.p_ind2 {
                            obs_2p.code_valid = true;
                            obs_2p.code = obs_val;
                        }
                    }
                }
            }

            if !missing_iods.is_empty() {
                warn!("missing eph for {}, IODs {}", prn, missing_iods.join(" "));
            }

            if any {
                out.push(SatObs {
                    prn,
                    time: epoch_rcv,
                    obs: vec![obs_1c, obs_1p, obs_2p],
                });
            }
        }
    }

    fn select_eph(&self, prn: &Prn, iod: u32) -> Option<Eph> {
        if let Some(eph) = self.store.last(prn) {
            if eph.iod() == iod {
                return Some(eph);
            }
        }
        if let Some(eph) = self.store.prev(prn) {
            if eph.iod() == iod {
                return Some(eph);
            }
        }
        None
    }
}

/// Geometric range from a station to a satellite at reception time `t`,
/// iterating the signal travel time and correcting for the earth rotation
/// during it. Returns the range and the satellite clock offset in meters.
fn geometric_range(eph: &Eph, station: &ECEF, t: &GpsTime) -> Option<(f64, f64)> {
    let mut rho = 0.0;
    let mut clk_m = 0.0;
    for _ in 0..10 {
        let rho_prev = rho;
        let tot = *t - rho / C_LIGHT;
        let state = eph.state_at(&tot, false).ok()?;

        // rotate the satellite into the ECEF frame of the reception time
        let phi = OMEGA_EARTH * rho / C_LIGHT;
        let (sin_p, cos_p) = (phi.sin(), phi.cos());
        let x = state.pos[0] * cos_p + state.pos[1] * sin_p;
        let y = -state.pos[0] * sin_p + state.pos[1] * cos_p;
        let z = state.pos[2];

        let dx = x - station.x();
        let dy = y - station.y();
        let dz = z - station.z();
        rho = (dx * dx + dy * dy + dz * dz).sqrt();
        clk_m = state.clock * C_LIGHT;

        if (rho - rho_prev).abs() < 1e-4 {
            return Some((rho, clk_m));
        }
    }
    Some((rho, clk_m))
}

#[cfg(test)]
mod tests {
    use super::super::packet::test_utils::{encode_packet, lead_in, pack_bits};
    use super::*;
    use crate::ephemeris::test_utils::test_gps_eph;
    use float_eq::assert_float_eq;

    fn now() -> GpsTime {
        GpsTime::new(2100, 600.5).unwrap()
    }

    fn msg03_payload(x: f64, y: f64, z: f64) -> Vec<u32> {
        pack_bits(&[
            (((x / 0.01).round() as i64 as i32) as u32, 32),
            (((y / 0.01).round() as i64 as i32) as u32, 32),
            (((z / 0.01).round() as i64 as i32) as u32, 32),
        ])
    }

    #[test]
    fn station_coordinates_recover_through_framing() {
        // two valid type 3 packets separated by one junk byte
        let (mut buf, tail) = lead_in();
        let (bytes, tail) = encode_packet(
            3,
            17,
            100,
            0,
            &msg03_payload(4_027_894.01, -307_045.60, 4_919_474.91),
            tail,
        );
        buf.extend_from_slice(&bytes);
        // a byte without the 01 framing marker, as line noise would look
        buf.push(0x13);
        let (bytes, _) = encode_packet(
            3,
            17,
            101,
            1,
            &msg03_payload(4_027_894.02, -307_045.61, 4_919_474.92),
            tail,
        );
        buf.extend_from_slice(&bytes);

        let mut decoder = Rtcm2Decoder::new(EphStore::new());
        let obs = decoder.decode(&buf, &now());
        assert!(obs.is_empty());

        // both packets parsed; the exposed coordinates are the newest ones
        assert_eq!(decoder.stations().len(), 2);
        let first = decoder.stations()[0].ecef;
        assert_float_eq!(first.x(), 4_027_894.01, abs <= 0.005);
        assert_float_eq!(first.y(), -307_045.60, abs <= 0.005);
        assert_float_eq!(first.z(), 4_919_474.91, abs <= 0.005);

        let station = decoder.station_coordinates().unwrap();
        assert_float_eq!(station.x(), 4_027_894.02, abs <= 0.005);
        assert_float_eq!(station.z(), 4_919_474.92, abs <= 0.005);
    }

    #[test]
    fn observation_block_emits_satellites() {
        // an 18/19 block needs four packets; build them for one satellite
        let range = 21_000_000.0_f64;
        let rng_counts = (range / 0.02) as u32;
        let phase_l1 = range / GPS_L1_WAVELENGTH;
        let cph_l1 = (-(phase_l1 % 8_388_608.0) * 256.0) as i32 as u32;
        let phase_l2 = range / GPS_L2_WAVELENGTH;
        let cph_l2 = (-(phase_l2 % 8_388_608.0) * 256.0) as i32 as u32;

        let sat = |code: u32, gnss: u32, meas: u32| {
            pack_bits(&[
                (0, 1),
                (code, 1),
                (gnss, 1),
                (12, 5),
                (0, 3),
                (2, 5),
                (meas, 32),
            ])
        };
        let header = |l2: u32| pack_bits(&[(l2, 1), (0, 1), (0, 2), (0, 20)]);

        let mut packets = Vec::new();
        for (msg_type, l2, meas) in [
            (18_u32, 0_u32, cph_l1),
            (18, 1, cph_l2),
            (19, 0, rng_counts),
            (19, 1, rng_counts),
        ]
        .iter()
        {
            let mut payload = header(*l2);
            payload.extend(sat(1, 0, *meas));
            packets.push((*msg_type, payload));
        }

        let (mut buf, mut tail) = lead_in();
        for (msg_type, payload) in &packets {
            // z-count 1000 puts the epoch at 600 s of hour
            let (bytes, next) = encode_packet(*msg_type, 17, 1000, 0, payload, tail);
            buf.extend_from_slice(&bytes);
            tail = next;
        }

        let mut decoder = Rtcm2Decoder::new(EphStore::new());
        let obs = decoder.decode(&buf, &now());

        assert_eq!(obs.len(), 1);
        let sat_obs = &obs[0];
        assert_eq!(sat_obs.prn.to_string(), "G12");
        assert_float_eq!(sat_obs.time.tow(), 600.0, abs <= 1e-9);
        assert_eq!(sat_obs.obs.len(), 3);

        let l1 = &sat_obs.obs[1];
        assert_eq!(l1.channel, "1W");
        assert!(l1.phase_valid);
        // the resolved phase lands within half a wavelength of the range
        assert!((l1.phase * GPS_L1_WAVELENGTH - range).abs() < GPS_L1_WAVELENGTH);
    }

    #[test]
    fn corrections_translate_against_station_and_ephemeris() {
        let t = now();
        let store = EphStore::new();
        let eph = test_gps_eph(9, t, 71);
        store.put(eph.clone(), false, &t).unwrap();

        // put the station at the subsatellite point so geometry is sane
        let state = eph.state_at(&t, false).unwrap();
        let station_pos = state.pos * (6.378e6 / state.pos.norm());
        let station = ECEF::from_vector3(station_pos);

        let mut decoder = Rtcm2Decoder::new(store);

        let (mut buf, mut tail) = lead_in();
        let (bytes, next) = encode_packet(
            3,
            17,
            100,
            0,
            &msg03_payload(station.x(), station.y(), station.z()),
            tail,
        );
        buf.extend_from_slice(&bytes);
        tail = next;

        // z-count 1000 -> 600 s of hour, matching `now`
        let corr20 = |prn: u32, mult: u32| {
            pack_bits(&[
                (0, 1),
                (0, 1),
                (0, 2),
                (0, 20),
                (mult, 1),
                (0, 1),
                (0, 1),
                (prn, 5),
                (0, 3),
                (1, 5),
                (71, 8),
                (256, 24),
                // a second satellite record marked GLONASS, skipped by the
                // translation but needed for an odd word count
                (mult, 1),
                (0, 1),
                (1, 1),
                (3, 5),
                (0, 3),
                (1, 5),
                (0, 8),
                (0, 24),
            ])
        };
        let (bytes, next) = encode_packet(20, 17, 1000, 0, &corr20(9, 1), tail);
        buf.extend_from_slice(&bytes);
        tail = next;

        let corr21 = |prn: u32| {
            pack_bits(&[
                (0, 1),
                (0, 1),
                (0, 2),
                (0, 20),
                (0, 1),
                (1, 1),
                (0, 1),
                (prn, 5),
                (0, 1),
                (0, 3),
                (0, 1),
                (0, 3),
                (71, 8),
                (250, 16),
                (0, 8),
                (0, 1),
                (1, 1),
                (1, 1),
                (3, 5),
                (0, 1),
                (0, 3),
                (0, 1),
                (0, 3),
                (0, 8),
                (0, 16),
                (0, 8),
            ])
        };
        let (bytes, _) = encode_packet(21, 17, 1000, 0, &corr21(9), tail);
        buf.extend_from_slice(&bytes);

        let obs = decoder.decode(&buf, &t);
        assert_eq!(obs.len(), 1);
        let sat_obs = &obs[0];
        assert_eq!(sat_obs.prn.to_string(), "G09");

        // the synthetic P1 observation is the iterated geometric range minus
        // the 5 m broadcast correction and the satellite clock
        let p1 = sat_obs.obs.iter().find(|o| o.channel == "1W").unwrap();
        assert!(p1.code_valid);
        let (rho, clk_m) = geometric_range(&eph, &station, &t).unwrap();
        assert_float_eq!(p1.code, rho - 5.0 - clk_m, abs <= 1e-6);
    }
}
