// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! ACM0002 emissions arithmetic for grid-connected run-of-river hydro.
//!
//! `BE = EG × EF_grid`, `PE = 0`, `LE = 0`, `ER = BE − PE − LE`. Units are kg CO2
//! per kWh on input; kg/kWh and t/MWh are numerically equal, so
//! [`EmissionsResult::net_reduction_tonnes`] is a plain unit shift.

use serde::{Deserialize, Serialize};

use crate::error::{MrvError, MrvResult};
use crate::reading::TelemetryReading;

pub const METHODOLOGY: &str = "ACM0002";

/// Grid-connected renewables carry no leakage under ACM0002.
pub const LEAKAGE_EMISSIONS_KG: f64 = 0.0;

/// Run-of-river hydro without a reservoir is a zero-emission source.
pub const PROJECT_EMISSIONS_KG: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionsResult {
    pub baseline_emissions_kg: f64,
    pub project_emissions_kg: f64,
    pub net_reduction_kg: f64,
}

impl EmissionsResult {
    pub fn net_reduction_tonnes(&self) -> f64 {
        self.net_reduction_kg / 1000.0
    }

    pub fn certification_ready(&self) -> bool {
        self.net_reduction_kg > 0.0
    }

    pub fn methodology(&self) -> &'static str {
        METHODOLOGY
    }
}

pub fn compute(reading: &TelemetryReading) -> MrvResult<EmissionsResult> {
    if !reading.generated_kwh.is_finite() || reading.generated_kwh < 0.0 {
        return Err(MrvError::invalid_input("generated_kwh", reading.generated_kwh));
    }
    if !reading.grid_emission_factor.is_finite() || reading.grid_emission_factor <= 0.0 {
        return Err(MrvError::invalid_input("grid_emission_factor", reading.grid_emission_factor));
    }

    let baseline = reading.generated_kwh * reading.grid_emission_factor;
    let project = PROJECT_EMISSIONS_KG;
    Ok(EmissionsResult {
        baseline_emissions_kg: baseline,
        project_emissions_kg: project,
        net_reduction_kg: baseline - project - LEAKAGE_EMISSIONS_KG,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecIssuance {
    pub er_tonnes: f64,
    pub ratio: f64,
    pub recs_issued: f64,
}

/// Renewable energy certificates issued against a net reduction in tonnes.
pub fn rec_issuance(er_tonnes: f64, ratio: f64) -> MrvResult<RecIssuance> {
    if !er_tonnes.is_finite() || er_tonnes < 0.0 {
        return Err(MrvError::invalid_input("er_tonnes", er_tonnes));
    }
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(MrvError::invalid_input("ratio", ratio));
    }
    Ok(RecIssuance {
        er_tonnes,
        ratio,
        recs_issued: er_tonnes * ratio,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoyaltySplit {
    pub recs_issued: f64,
    pub royalty_fraction: f64,
    pub royalty_recs: f64,
    pub operator_recs: f64,
}

pub fn royalty_split(recs_issued: f64, royalty_fraction: f64) -> MrvResult<RoyaltySplit> {
    if !recs_issued.is_finite() || recs_issued < 0.0 {
        return Err(MrvError::invalid_input("recs_issued", recs_issued));
    }
    if !royalty_fraction.is_finite() || !(0.0..=1.0).contains(&royalty_fraction) {
        return Err(MrvError::invalid_input("royalty_fraction", royalty_fraction));
    }
    let royalty_recs = recs_issued * royalty_fraction;
    Ok(RoyaltySplit {
        recs_issued,
        royalty_fraction,
        royalty_recs,
        operator_recs: recs_issued - royalty_recs,
    })
}
