// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.

use swiftnav_ppp::coords::{ECEF, LLHRadians, OMEGA_EARTH};
use swiftnav_ppp::ephemeris::{BroadcastEph, Eph, EphStore, GpsEph, KeplerParams};
use swiftnav_ppp::obs::{FrqObs, SatObs};
use swiftnav_ppp::ppp::{PppClient, PppOptions};
use swiftnav_ppp::signal::consts::C_LIGHT;
use swiftnav_ppp::signal::{carrier_frequency, Prn, System};
use swiftnav_ppp::time::GpsTime;
use swiftnav_ppp::trop;

const D2R: f64 = std::f64::consts::PI / 180.0;

fn rover_truth() -> [f64; 3] {
    let ecef = LLHRadians::new(48.0 * D2R, 11.0 * D2R, 550.0).to_ecef();
    [ecef.x(), ecef.y(), ecef.z()]
}

/// Geometric range with the satellite rotated by the earth rotation during
/// the signal travel time, the same convention the engine models
fn travel_range(sat: &[f64; 3], rover: &[f64; 3]) -> f64 {
    let dx = sat[0] - rover[0];
    let dy = sat[1] - rover[1];
    let dz = sat[2] - rover[2];
    let rho0 = (dx * dx + dy * dy + dz * dz).sqrt();
    let phi = OMEGA_EARTH * rho0 / C_LIGHT;
    let x = phi.cos() * sat[0] + phi.sin() * sat[1];
    let y = -phi.sin() * sat[0] + phi.cos() * sat[1];
    let dx = x - rover[0];
    let dy = y - rover[1];
    let dz = sat[2] - rover[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// A small constellation whose ground tracks pass near the rover, so every
/// satellite stands high above the horizon
fn visible_constellation(toc: GpsTime) -> Vec<Eph> {
    let lat = 48.0 * D2R;
    let lon = 11.0 * D2R;
    let inc = 0.96_f64;
    let omega = 0.3_f64;

    let u_star = (lat.sin() / inc.sin()).asin();
    let lam_p = (inc.cos() * u_star.sin()).atan2(u_star.cos());
    let omega0_star = lon + OMEGA_EARTH * toc.tow() - lam_p;
    let m0_star = u_star - omega;

    (0..6)
        .map(|k| {
            Eph::new(BroadcastEph::Gps(GpsEph {
                prn: Prn::new(System::Gps, (k + 1) as u8).unwrap(),
                toc,
                toe: toc,
                iode: 30 + k as u32,
                health: 0,
                af: [1.0e-5, 0.0, 0.0],
                kepler: KeplerParams {
                    sqrt_a: 26_560_000.0_f64.sqrt(),
                    ecc: 0.001,
                    i0: inc,
                    omega0: omega0_star + (k as f64 - 2.5) * 0.06,
                    m0: m0_star + (k as f64 - 2.5) * 0.10,
                    omega,
                    ..KeplerParams::default()
                },
            }))
        })
        .collect()
}

/// Observations consistent with the broadcast orbits and the engine's
/// measurement model: dual-frequency code and phase with a fixed receiver
/// clock, wet delay and per-satellite ambiguity
fn synth_obs(eph: &Eph, rover: &[f64; 3], t: GpsTime, amb_m: f64) -> SatObs {
    let clk_rx_m = 220.0;
    let wet_m = 0.06;
    let rover_ecef = ECEF::new(rover[0], rover[1], rover[2]);
    let height = rover_ecef.to_llh().height();

    let mut p3 = 2.2e7;
    let mut state = eph.state_at(&t, false).unwrap();
    for _ in 0..20 {
        let tot = t - p3 / C_LIGHT - state.clock;
        state = eph.state_at(&tot, false).unwrap();
        let sat = [state.pos[0], state.pos[1], state.pos[2]];
        let azel = rover_ecef.azel_to(&ECEF::new(sat[0], sat[1], sat[2]));
        let trop_total =
            trop::saastamoinen_delay(height, azel.el()) + wet_m * trop::wet_mapping(azel.el());
        p3 = travel_range(&sat, rover) + clk_rx_m - state.clock * C_LIGHT + trop_total;
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
fn static_rover_converges_and_recovers_after_reset() {
    let _ = env_logger::builder().is_test(true).try_init();

    let rover = rover_truth();
    let toc = GpsTime::new(2200, 172_800.0).unwrap();
    let ephs = visible_constellation(toc);

    let opt = PppOptions {
        xyz_apr_rover: [rover[0] + 25.0, rover[1] + 10.0, rover[2] - 30.0],
        apr_sig_crd: [100.0; 3],
        noise_crd: [0.0; 3],
        ..PppOptions::default()
    };
    let mut client = PppClient::new(opt);
    for eph in &ephs {
        client.put_ephemeris(eph);
    }

    let mut last = None;
    for k in 0..50 {
        let t = toc + (60.0 + f64::from(k));
        let obs: Vec<SatObs> = ephs
            .iter()
            .enumerate()
            .map(|(i, eph)| synth_obs(eph, &rover, t, 2.0 + 4.0 * i as f64))
            .collect();
        let output = client.process_epoch(&obs);
        assert!(!output.error, "epoch {} failed:\n{}", k, output.log);
        last = Some(output);
    }
    let last = last.unwrap();

    for i in 0..3 {
        assert!(
            (last.xyz[i] - rover[i]).abs() < 0.5,
            "axis {}: {:.3} vs {:.3}",
            i,
            last.xyz[i],
            rover[i]
        );
    }
    assert_eq!(last.num_sat, 6);
    assert!(last.hdop > 0.0);
    assert!(last.cov[0] > 0.0 && last.cov[3] > 0.0 && last.cov[5] > 0.0);
    assert!(last.trp_stdev > 0.0);
    assert!(last.log.contains("X = "));

    // a reset discards the estimation state; the ephemeris store is empty
    // and the next epoch reports an error instead of a stale solution
    client.reset();
    let t = toc + 120.0;
    let obs: Vec<SatObs> = ephs
        .iter()
        .map(|eph| synth_obs(eph, &rover, t, 2.0))
        .collect();
    let output = client.process_epoch(&obs);
    assert!(output.error);

    // refeeding the ephemerides brings the engine back, starting from the
    // a priori uncertainty
    for eph in &ephs {
        client.put_ephemeris(eph);
    }
    let obs: Vec<SatObs> = ephs
        .iter()
        .enumerate()
        .map(|(i, eph)| synth_obs(eph, &rover, t + 1.0, 2.0 + 4.0 * i as f64))
        .collect();
    let output = client.process_epoch(&obs);
    assert!(!output.error, "{}", output.log);
    assert!(output.cov[0].sqrt() <= 100.0);
}

#[test]
fn implausible_ephemeris_never_reaches_the_evaluator() {
    let toc = GpsTime::new(2200, 172_800.0).unwrap();
    let store = EphStore::new();
    let good = visible_constellation(toc).remove(0);
    let prn = good.prn();
    store.put(good, true, &toc).unwrap();

    // an orbit at 1e8 m geocentric distance fails the radius gate
    let rogue = Eph::new(BroadcastEph::Gps(GpsEph {
        prn,
        toc: toc + 60.0,
        toe: toc + 60.0,
        iode: 99,
        health: 0,
        af: [0.0; 3],
        kepler: KeplerParams {
            sqrt_a: 1.0e8_f64.sqrt(),
            ecc: 0.0,
            i0: 0.9,
            ..KeplerParams::default()
        },
    }));
    assert!(store.put(rogue, true, &toc).is_err());

    // the evaluator keeps answering from the prior data set, and every
    // state it returns stays inside the plausible radius band
    let state = store.sat_state(&prn, &(toc + 300.0), false).unwrap();
    let r = state.pos.norm();
    assert!(r > 2.0e7 && r < 6.0e7);
    assert_eq!(store.last(&prn).unwrap().iod(), 30);
}

#[test]
fn decoder_and_client_share_one_store() {
    let toc = GpsTime::new(2200, 172_800.0).unwrap();
    let store = EphStore::new();
    let _decoder = swiftnav_ppp::rtcm2::Rtcm2Decoder::new(store.clone());
    let mut client = PppClient::with_store(PppOptions::default(), store.clone());

    // an ephemeris fed through the client is visible through every handle
    let eph = visible_constellation(toc).remove(2);
    let prn = eph.prn();
    client.put_ephemeris(&eph);
    assert!(store.last(&prn).is_some());

    // and a reset clears the shared store for all parties
    client.reset();
    assert!(store.last(&prn).is_none());
}
