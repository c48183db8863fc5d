// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Processing options of a PPP client
//!
//! A plain data record owned by the caller; the client copies it at
//! construction and [`crate::ppp::PppClient::reset`] does not touch it.

use crate::signal::System;

/// Linear combinations the filter can process per constellation
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize, strum::Display,
)]
pub enum LinearCombination {
    /// Dual-frequency ionosphere-free code combination
    CodeIonoFree,
    /// Dual-frequency ionosphere-free phase combination
    PhaseIonoFree,
}

/// Processing options of one PPP client
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PppOptions {
    /// A priori rover position, ECEF m; all-zero when unknown
    pub xyz_apr_rover: [f64; 3],
    /// Initial sigma on the rover coordinates, m
    pub apr_sig_crd: [f64; 3],
    /// Process noise on the rover coordinates per second, m; zero for static
    pub noise_crd: [f64; 3],
    /// Receiver clock resampling noise, m
    pub noise_clk: f64,
    /// Initial sigma on the tropospheric zenith wet delay, m
    pub apr_sig_trp: f64,
    /// Random walk noise on the troposphere, m/sqrt(s)
    pub noise_trp: f64,
    /// Sigma used when an ambiguity is (re)initialized, m
    pub apr_sig_amb: f64,
    /// Code measurement sigma, m
    pub sigma_c1: f64,
    /// Phase measurement sigma, m
    pub sigma_l1: f64,
    /// Code residual rejection threshold, m
    pub max_res_c1: f64,
    /// Phase residual rejection threshold, m
    pub max_res_l1: f64,
    /// Scale code variance with 1/sin^2(elevation)
    pub ele_wgt_code: bool,
    /// Scale phase variance with 1/sin^2(elevation)
    pub ele_wgt_phase: bool,
    /// Elevation cutoff, rad
    pub min_ele: f64,
    /// Minimum observations per epoch; effective floor is 4
    pub min_obs: usize,
    /// Initial convergence window during which residual screening is
    /// suspended, s
    pub seeding_time: f64,
    /// Apply attached SSR corrections during satellite state evaluation
    pub use_orb_clk_corr: bool,
    /// Linear combinations per constellation; an empty list excludes the
    /// constellation
    pub lcs_gps: Vec<LinearCombination>,
    pub lcs_glonass: Vec<LinearCombination>,
    pub lcs_galileo: Vec<LinearCombination>,
    pub lcs_bds: Vec<LinearCombination>,
}

impl Default for PppOptions {
    fn default() -> PppOptions {
        let both = vec![
            LinearCombination::CodeIonoFree,
            LinearCombination::PhaseIonoFree,
        ];
        PppOptions {
            xyz_apr_rover: [0.0; 3],
            apr_sig_crd: [100.0; 3],
            noise_crd: [0.0; 3],
            noise_clk: 1000.0,
            apr_sig_trp: 0.1,
            noise_trp: 1.0e-6,
            apr_sig_amb: 1000.0,
            sigma_c1: 2.0,
            sigma_l1: 0.01,
            max_res_c1: 3.0,
            max_res_l1: 0.03,
            ele_wgt_code: false,
            ele_wgt_phase: false,
            min_ele: 0.0,
            min_obs: 4,
            seeding_time: 0.0,
            use_orb_clk_corr: true,
            lcs_gps: both.clone(),
            lcs_glonass: both.clone(),
            lcs_galileo: both.clone(),
            lcs_bds: both,
        }
    }
}

impl PppOptions {
    /// The linear combinations configured for a constellation
    #[must_use]
    pub fn lcs(&self, system: System) -> &[LinearCombination] {
        match system {
            System::Glo => &self.lcs_glonass,
            System::Gal => &self.lcs_galileo,
            System::Bds => &self.lcs_bds,
            _ => &self.lcs_gps,
        }
    }

    /// Whether a constellation takes part in the estimation
    #[must_use]
    pub fn use_system(&self, system: System) -> bool {
        !self.lcs(system).is_empty()
    }

    /// The constellations taking part in the estimation
    #[must_use]
    pub fn systems(&self) -> Vec<System> {
        [System::Gps, System::Glo, System::Gal, System::Bds]
            .iter()
            .copied()
            .filter(|s| self.use_system(*s))
            .collect()
    }

    /// Whether the troposphere is estimated at all
    #[must_use]
    pub fn estimates_tropo(&self) -> bool {
        self.apr_sig_trp > 0.0 || self.noise_trp > 0.0
    }

    /// Minimum usable observations per epoch, never below 4
    #[must_use]
    pub fn effective_min_obs(&self) -> usize {
        self.min_obs.max(4)
    }

    /// Whether an a priori rover position was configured
    #[must_use]
    pub fn has_apr_position(&self) -> bool {
        self.xyz_apr_rover.iter().any(|&v| v != 0.0)
    }
}
