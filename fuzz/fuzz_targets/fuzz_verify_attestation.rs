#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use chrono::{Duration, TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use mrv_core::attestation::Attestation;
use mrv_core::emissions;
use mrv_core::reading::TelemetryReading;
use mrv_core::scorer::AnomalyScore;
use mrv_core::verifier::{verify, ReasonCode, VerificationPolicy};

#[derive(Debug, Arbitrary)]
struct Input {
    generated_kwh: f64,
    grid_emission_factor: f64,
    anomaly: f64,
    age_seconds: i32,
    anomaly_threshold: f64,
    max_plausible_kwh: f64,
    max_age_seconds: u64,
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let Ok(input) = Input::arbitrary(&mut u) else {
        return;
    };
    let Some(now) = Utc.timestamp_opt(1_767_225_600, 0).single() else {
        return;
    };

    let reading = TelemetryReading::new(
        "FUZZ-1",
        now - Duration::seconds(i64::from(input.age_seconds)),
        input.generated_kwh,
        input.grid_emission_factor,
    );
    let Ok(emissions) = emissions::compute(&reading) else {
        assert!(reading.validate().is_err());
        return;
    };
    assert_eq!(
        emissions.net_reduction_kg,
        emissions.baseline_emissions_kg - emissions.project_emissions_kg
    );

    let score = AnomalyScore::from_value(input.anomaly, 0.5);
    let Ok(att) = Attestation::build_at(reading, emissions, score, now) else {
        return;
    };
    let policy = VerificationPolicy {
        anomaly_threshold: input.anomaly_threshold,
        max_plausible_kwh_per_reading: input.max_plausible_kwh,
        max_reading_age_seconds: input.max_age_seconds,
    };
    if policy.validate().is_err() {
        return;
    }

    let d = verify(&att, &policy, now);
    assert_eq!(d.approved, d.reason_code == ReasonCode::Ok);
    assert_eq!(d.attestation_hash, att.content_hash());
    if att.anomaly().value > policy.anomaly_threshold {
        assert_eq!(d.reason_code, ReasonCode::AnomalyRejected);
    }
    assert_eq!(verify(&att, &policy, now), d);
});
