// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MrvError, MrvResult};

/// One metered generation sample from a device, as handed over by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub device_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub generated_kwh: f64,
    /// kg CO2 per kWh displaced on the grid.
    pub grid_emission_factor: f64,
}

impl TelemetryReading {
    pub fn new(
        device_id: impl Into<String>,
        timestamp_utc: DateTime<Utc>,
        generated_kwh: f64,
        grid_emission_factor: f64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp_utc,
            generated_kwh,
            grid_emission_factor,
        }
    }

    /// Range checks shared by the calculator and the scorer.
    pub fn validate(&self) -> MrvResult<()> {
        if self.device_id.trim().is_empty() {
            return Err(MrvError::invalid_input("device_id", "<empty>"));
        }
        if !self.generated_kwh.is_finite() || self.generated_kwh < 0.0 {
            return Err(MrvError::invalid_input("generated_kwh", self.generated_kwh));
        }
        if !self.grid_emission_factor.is_finite() || self.grid_emission_factor <= 0.0 {
            return Err(MrvError::invalid_input("grid_emission_factor", self.grid_emission_factor));
        }
        Ok(())
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant; used by tests and offline replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, h, 0, 0).unwrap()
    }

    #[test]
    fn validate_accepts_zero_generation() {
        let r = TelemetryReading::new("TURBINE-1", at(3), 0.0, 0.8);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn validate_names_offending_field() {
        let r = TelemetryReading::new("TURBINE-1", at(3), -1.0, 0.8);
        assert_eq!(
            r.validate(),
            Err(MrvError::InvalidInput {
                field: "generated_kwh",
                value: "-1".to_string()
            })
        );

        let r = TelemetryReading::new("TURBINE-1", at(3), 10.0, 0.0);
        let err = r.validate().expect_err("zero factor");
        assert!(err.to_string().contains("grid_emission_factor"));

        let r = TelemetryReading::new(" ", at(3), 10.0, 0.8);
        assert!(r.validate().is_err());
    }

    #[test]
    fn fixed_clock_is_fixed() {
        let c = FixedClock(at(9));
        assert_eq!(c.now(), c.now());
        assert_eq!(c.now(), at(9));
    }

    #[test]
    fn reading_json_uses_rfc3339_timestamp() {
        let r = TelemetryReading::new("TURBINE-1", at(12), 1000.0, 0.8);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("2026-01-15T12:00:00Z"));
        let back: TelemetryReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
