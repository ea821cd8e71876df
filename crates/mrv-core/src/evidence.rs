// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Evidence records: the signed attestation plus the verifier's decision, in
//! the canonical JSON form handed to ledger submission and reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attestation::{verify_digest, Attestation, AttestationSigner, SignedAttestation};
use crate::canonical::{canonical_json, sha256_domain, timestamp};
use crate::emissions;
use crate::error::{MrvError, MrvResult};
use crate::reading::{Clock, TelemetryReading};
use crate::scorer::AnomalyScorer;
use crate::verifier::{ReasonCode, VerificationDecision, Verifier};

pub const EVIDENCE_SCHEMA_V1: &str = "mrv.v1.evidence_record";

const DOMAIN_DECISION_V1: &[u8] = b"mrv:decision-signature:v1";

#[derive(Serialize)]
struct CanonicalDecision<'a> {
    schema: &'static str,
    attestation_hash: &'a str,
    attestation_signature_hex: &'a str,
    approved: bool,
    reason_code: &'static str,
    verified_at: String,
}

/// Digest binding the decision to the signed attestation it judges.
fn decision_digest(
    attestation: &SignedAttestation,
    decision: &VerificationDecision,
) -> MrvResult<[u8; 32]> {
    let body = CanonicalDecision {
        schema: EVIDENCE_SCHEMA_V1,
        attestation_hash: &decision.attestation_hash,
        attestation_signature_hex: &attestation.signature_hex,
        approved: decision.approved,
        reason_code: decision.reason_code.as_str(),
        verified_at: timestamp(&decision.verified_at),
    };
    Ok(sha256_domain(DOMAIN_DECISION_V1, &canonical_json(&body)?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub schema: String,
    pub attestation: SignedAttestation,
    pub decision: VerificationDecision,
    /// Signature by the attestation's verifier key over the decision.
    pub decision_signature_hex: String,
}

impl EvidenceRecord {
    /// Signs `decision` with the key that signed `attestation`.
    pub fn seal(
        signer: &AttestationSigner,
        attestation: SignedAttestation,
        decision: VerificationDecision,
    ) -> MrvResult<Self> {
        if attestation.verifier_public_key_hex != signer.public_key_hex() {
            return Err(MrvError::SignatureInvalid);
        }
        decision.validate()?;
        let digest = decision_digest(&attestation, &decision)?;
        let record = Self {
            schema: EVIDENCE_SCHEMA_V1.to_string(),
            decision_signature_hex: signer.sign_digest(&digest),
            attestation,
            decision,
        };
        record.check_reference()?;
        Ok(record)
    }

    fn check_reference(&self) -> MrvResult<()> {
        let hash = self.attestation.attestation.content_hash();
        if self.decision.attestation_hash != hash {
            return Err(MrvError::IntegrityMismatch {
                expected: self.decision.attestation_hash.clone(),
                actual: hash.to_string(),
            });
        }
        Ok(())
    }

    /// Full check against the embedded verifier key. Proves the record is
    /// internally consistent, not who produced it.
    pub fn verify(&self) -> MrvResult<()> {
        self.verify_with_key(&self.attestation.verifier_public_key_hex)
    }

    /// Full check against a verifier key the caller already trusts.
    pub fn verify_with_key(&self, public_key_hex: &str) -> MrvResult<()> {
        if self.schema != EVIDENCE_SCHEMA_V1 {
            return Err(MrvError::serialization(
                "schema",
                format!("unsupported evidence schema {}", self.schema),
            ));
        }
        let trusted = public_key_hex.trim();
        if !self
            .attestation
            .verifier_public_key_hex
            .eq_ignore_ascii_case(trusted)
        {
            return Err(MrvError::SignatureInvalid);
        }
        self.check_reference()?;
        self.decision.validate()?;
        self.attestation.verify_signature_with(trusted)?;
        let digest = decision_digest(&self.attestation, &self.decision)?;
        verify_digest(trusted, &digest, &self.decision_signature_hex)
    }

    pub fn to_json_bytes(&self) -> MrvResult<Vec<u8>> {
        canonical_json(self)
    }

    /// Decodes a persisted record and checks it against its embedded key.
    pub fn from_json_bytes(bytes: &[u8]) -> MrvResult<Self> {
        let record = Self::decode(bytes)?;
        record.verify()?;
        Ok(record)
    }

    /// Decodes a persisted record and checks it against a trusted key.
    pub fn from_json_bytes_with_key(bytes: &[u8], public_key_hex: &str) -> MrvResult<Self> {
        let record = Self::decode(bytes)?;
        record.verify_with_key(public_key_hex)?;
        Ok(record)
    }

    fn decode(bytes: &[u8]) -> MrvResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| MrvError::serialization("evidence_record", e.to_string()))
    }

    pub fn summary(&self) -> EvidenceSummary {
        let att = &self.attestation.attestation;
        EvidenceSummary {
            device_id: att.reading().device_id.clone(),
            reading_at: att.reading().timestamp_utc,
            generated_kwh: att.reading().generated_kwh,
            net_reduction_tonnes: att.emissions().net_reduction_tonnes(),
            methodology: att.emissions().methodology(),
            anomaly_value: att.anomaly().value,
            approved: self.decision.approved,
            reason_code: self.decision.reason_code,
            content_hash: att.content_hash().to_string(),
            verifier_public_key_hex: self.attestation.verifier_public_key_hex.clone(),
            verified_at: self.decision.verified_at,
        }
    }
}

/// Flat view of a record for human-readable reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceSummary {
    pub device_id: String,
    pub reading_at: DateTime<Utc>,
    pub generated_kwh: f64,
    pub net_reduction_tonnes: f64,
    pub methodology: &'static str,
    pub anomaly_value: f64,
    pub approved: bool,
    pub reason_code: ReasonCode,
    pub content_hash: String,
    pub verifier_public_key_hex: String,
    pub verified_at: DateTime<Utc>,
}

/// Runs a reading through calculator, scorer, builder, verifier and signer.
#[derive(Debug)]
pub struct EvidencePipeline<'a, C: Clock> {
    scorer: &'a AnomalyScorer,
    verifier: &'a Verifier<C>,
    signer: &'a AttestationSigner,
}

impl<'a, C: Clock> EvidencePipeline<'a, C> {
    pub fn new(
        scorer: &'a AnomalyScorer,
        verifier: &'a Verifier<C>,
        signer: &'a AttestationSigner,
    ) -> Self {
        Self {
            scorer,
            verifier,
            signer,
        }
    }

    pub fn process(
        &self,
        reading: TelemetryReading,
        previous: Option<&TelemetryReading>,
    ) -> MrvResult<EvidenceRecord> {
        let emissions = emissions::compute(&reading)?;
        let anomaly = self.scorer.score_with_previous(&reading, previous)?;
        let attestation = Attestation::build(reading, emissions, anomaly)?;
        let decision = self.verifier.verify(&attestation);
        let signed = self.signer.sign(attestation)?;
        if !decision.approved {
            tracing::warn!(
                target: "mrv.verifier",
                device_id = %signed.attestation.reading().device_id,
                reason = %decision.reason_code,
                attestation_hash = %decision.attestation_hash,
                "attestation rejected"
            );
        }
        EvidenceRecord::seal(self.signer, signed, decision)
    }
}
