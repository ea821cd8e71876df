// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::attestation::Attestation;
use crate::error::{MrvError, MrvResult};
use crate::reading::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationPolicy {
    pub anomaly_threshold: f64,
    pub max_plausible_kwh_per_reading: f64,
    pub max_reading_age_seconds: u64,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            anomaly_threshold: 0.5,
            max_plausible_kwh_per_reading: 5_000.0,
            max_reading_age_seconds: 3_600,
        }
    }
}

impl VerificationPolicy {
    pub fn validate(&self) -> MrvResult<()> {
        if !self.anomaly_threshold.is_finite() || !(0.0..=1.0).contains(&self.anomaly_threshold) {
            return Err(MrvError::InvalidConfig(format!(
                "anomaly_threshold={} outside [0,1]",
                self.anomaly_threshold
            )));
        }
        if !self.max_plausible_kwh_per_reading.is_finite()
            || self.max_plausible_kwh_per_reading <= 0.0
        {
            return Err(MrvError::InvalidConfig(format!(
                "max_plausible_kwh_per_reading={} must be positive",
                self.max_plausible_kwh_per_reading
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Ok,
    AnomalyRejected,
    ImplausibleReading,
    StaleReading,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Ok => "OK",
            ReasonCode::AnomalyRejected => "ANOMALY_REJECTED",
            ReasonCode::ImplausibleReading => "IMPLAUSIBLE_READING",
            ReasonCode::StaleReading => "STALE_READING",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationState {
    Pending,
    Approved,
    Rejected,
}

impl VerificationState {
    pub fn transition(&self, to: VerificationState) -> MrvResult<VerificationState> {
        let valid = matches!(
            (self, to),
            (VerificationState::Pending, VerificationState::Approved)
                | (VerificationState::Pending, VerificationState::Rejected)
        );
        if valid {
            Ok(to)
        } else {
            Err(MrvError::InvalidTransition {
                from: format!("{self:?}"),
                to: format!("{to:?}"),
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationState::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationDecision {
    pub attestation_hash: String,
    pub approved: bool,
    pub reason_code: ReasonCode,
    pub verified_at: DateTime<Utc>,
}

impl VerificationDecision {
    /// A decision is approved exactly when its reason code is `OK`.
    pub fn validate(&self) -> MrvResult<()> {
        if self.approved != (self.reason_code == ReasonCode::Ok) {
            return Err(MrvError::InconsistentDecision {
                approved: self.approved,
                reason_code: self.reason_code.to_string(),
            });
        }
        Ok(())
    }

    pub fn state(&self) -> VerificationState {
        if self.approved {
            VerificationState::Approved
        } else {
            VerificationState::Rejected
        }
    }
}

fn reason_for(
    attestation: &Attestation,
    policy: &VerificationPolicy,
    now: DateTime<Utc>,
) -> ReasonCode {
    if attestation.anomaly().value > policy.anomaly_threshold {
        return ReasonCode::AnomalyRejected;
    }
    let kwh = attestation.reading().generated_kwh;
    if kwh > policy.max_plausible_kwh_per_reading || kwh < 0.0 {
        return ReasonCode::ImplausibleReading;
    }
    // Ages beyond chrono's range cannot be exceeded by any real reading.
    let max_age = i64::try_from(policy.max_reading_age_seconds)
        .ok()
        .and_then(Duration::try_seconds);
    if let Some(max_age) = max_age {
        if now.signed_duration_since(attestation.reading().timestamp_utc) > max_age {
            return ReasonCode::StaleReading;
        }
    }
    ReasonCode::Ok
}

/// Applies the policy rules in order; the first rule that matches decides.
pub fn verify(
    attestation: &Attestation,
    policy: &VerificationPolicy,
    now: DateTime<Utc>,
) -> VerificationDecision {
    let reason_code = reason_for(attestation, policy, now);
    let decision = VerificationDecision {
        attestation_hash: attestation.content_hash().to_string(),
        approved: reason_code == ReasonCode::Ok,
        reason_code,
        verified_at: now,
    };
    tracing::debug!(
        target: "mrv.verifier",
        attestation_hash = %decision.attestation_hash,
        device_id = %attestation.reading().device_id,
        reason = %decision.reason_code,
        "attestation verified"
    );
    decision
}

#[derive(Debug)]
pub struct Verifier<C: Clock = SystemClock> {
    policy: VerificationPolicy,
    clock: C,
}

impl Verifier<SystemClock> {
    pub fn new(policy: VerificationPolicy) -> MrvResult<Self> {
        Self::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> Verifier<C> {
    pub fn with_clock(policy: VerificationPolicy, clock: C) -> MrvResult<Self> {
        policy.validate()?;
        Ok(Self { policy, clock })
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    pub fn verify(&self, attestation: &Attestation) -> VerificationDecision {
        verify(attestation, &self.policy, self.clock.now())
    }

    /// Verifies independent attestations in parallel against one clock
    /// reading. Output order matches input order.
    pub fn verify_batch(&self, attestations: &[Attestation]) -> Vec<VerificationDecision> {
        let now = self.clock.now();
        let decisions: Vec<VerificationDecision> = attestations
            .par_iter()
            .map(|a| verify(a, &self.policy, now))
            .collect();
        let rejected = decisions.iter().filter(|d| !d.approved).count();
        tracing::info!(
            target: "mrv.verifier",
            total = decisions.len(),
            rejected,
            "batch verification complete"
        );
        decisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emissions;
    use crate::reading::{FixedClock, TelemetryReading};
    use crate::scorer::AnomalyScore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn attest(kwh: f64, anomaly: f64, age_secs: i64) -> Attestation {
        let r = TelemetryReading::new(
            "TURBINE-1",
            now() - Duration::seconds(age_secs),
            kwh,
            0.8,
        );
        let e = emissions::compute(&r).unwrap();
        Attestation::build_at(r, e, AnomalyScore::from_value(anomaly, 0.5), now()).unwrap()
    }

    fn policy() -> VerificationPolicy {
        VerificationPolicy {
            anomaly_threshold: 0.5,
            max_plausible_kwh_per_reading: 5_000.0,
            max_reading_age_seconds: 3_600,
        }
    }

    #[test]
    fn anomalous_attestation_is_rejected() {
        let a = attest(1000.0, 0.9, 10);
        let d = verify(&a, &policy(), now());
        assert!(!d.approved);
        assert_eq!(d.reason_code, ReasonCode::AnomalyRejected);
        assert_eq!(d.attestation_hash, a.content_hash());
        assert_eq!(d.state(), VerificationState::Rejected);
    }

    #[test]
    fn clean_recent_attestation_is_approved() {
        let d = verify(&attest(1000.0, 0.1, 10), &policy(), now());
        assert!(d.approved);
        assert_eq!(d.reason_code, ReasonCode::Ok);
        assert_eq!(d.state(), VerificationState::Approved);
        assert_eq!(d.verified_at, now());
    }

    #[test]
    fn anomaly_rule_precedes_plausibility() {
        let d = verify(&attest(9_000.0, 0.9, 10), &policy(), now());
        assert_eq!(d.reason_code, ReasonCode::AnomalyRejected);
    }

    #[test]
    fn plausibility_rule_precedes_staleness() {
        let d = verify(&attest(9_000.0, 0.1, 7_200), &policy(), now());
        assert_eq!(d.reason_code, ReasonCode::ImplausibleReading);
        let d = verify(&attest(1_000.0, 0.1, 7_200), &policy(), now());
        assert_eq!(d.reason_code, ReasonCode::StaleReading);
    }

    #[test]
    fn thresholds_are_strict_inequalities() {
        assert!(verify(&attest(5_000.0, 0.5, 3_600), &policy(), now()).approved);
        assert_eq!(
            verify(&attest(5_000.5, 0.5, 3_600), &policy(), now()).reason_code,
            ReasonCode::ImplausibleReading
        );
        assert_eq!(
            verify(&attest(5_000.0, 0.5, 3_601), &policy(), now()).reason_code,
            ReasonCode::StaleReading
        );
    }

    fn negative_attest(kwh: f64, anomaly: f64) -> Attestation {
        let r = TelemetryReading::new("TURBINE-1", now() - Duration::seconds(10), kwh, 0.8);
        let e = emissions::EmissionsResult {
            baseline_emissions_kg: kwh * 0.8,
            project_emissions_kg: 0.0,
            net_reduction_kg: kwh * 0.8,
        };
        Attestation::build_at(r, e, AnomalyScore::from_value(anomaly, 0.5), now()).unwrap()
    }

    #[test]
    fn negative_generation_is_implausible() {
        let d = verify(&negative_attest(-1.0, 0.1), &policy(), now());
        assert!(!d.approved);
        assert_eq!(d.reason_code, ReasonCode::ImplausibleReading);

        let d = verify(&negative_attest(-1.0, 0.9), &policy(), now());
        assert_eq!(d.reason_code, ReasonCode::AnomalyRejected);
    }

    #[test]
    fn decision_consistency() {
        let mut d = verify(&attest(1000.0, 0.1, 10), &policy(), now());
        d.validate().unwrap();
        d.reason_code = ReasonCode::StaleReading;
        assert!(matches!(
            d.validate(),
            Err(MrvError::InconsistentDecision { approved: true, .. })
        ));
    }

    #[test]
    fn future_dated_reading_is_not_stale() {
        assert!(verify(&attest(100.0, 0.1, -600), &policy(), now()).approved);
    }

    #[test]
    fn huge_max_age_never_goes_stale() {
        let p = VerificationPolicy {
            max_reading_age_seconds: u64::MAX,
            ..policy()
        };
        assert!(verify(&attest(100.0, 0.1, 86_400 * 365), &p, now()).approved);
    }

    #[test]
    fn reason_codes_serialize_as_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ReasonCode::AnomalyRejected).unwrap(),
            "\"ANOMALY_REJECTED\""
        );
        assert_eq!(ReasonCode::ImplausibleReading.to_string(), "IMPLAUSIBLE_READING");
        let back: ReasonCode = serde_json::from_str("\"STALE_READING\"").unwrap();
        assert_eq!(back, ReasonCode::StaleReading);
    }

    #[test]
    fn state_machine_is_terminal_after_decision() {
        let s = VerificationState::Pending
            .transition(VerificationState::Approved)
            .unwrap();
        assert!(s.is_terminal());
        assert!(s.transition(VerificationState::Rejected).is_err());
        assert!(VerificationState::Rejected
            .transition(VerificationState::Pending)
            .is_err());
    }

    #[test]
    fn policy_validation() {
        assert!(Verifier::new(VerificationPolicy::default()).is_ok());
        assert!(Verifier::new(VerificationPolicy {
            anomaly_threshold: 2.0,
            ..policy()
        })
        .is_err());
        assert!(Verifier::new(VerificationPolicy {
            max_plausible_kwh_per_reading: 0.0,
            ..policy()
        })
        .is_err());
    }

    #[test]
    fn batch_preserves_order_and_matches_single() {
        let verifier = Verifier::with_clock(policy(), FixedClock(now())).unwrap();
        let batch: Vec<Attestation> = (0..64)
            .map(|i| attest(100.0 * f64::from(i), f64::from(i % 10) / 10.0, 60))
            .collect();
        let decisions = verifier.verify_batch(&batch);
        assert_eq!(decisions.len(), batch.len());
        for (a, d) in batch.iter().zip(&decisions) {
            assert_eq!(d, &verifier.verify(a));
        }
    }
}
