// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Attestations bind one reading to its emissions figures and anomaly score.
//!
//! The content hash covers `{reading, emissions, anomaly}` only; `created_at`
//! and signatures sit outside it. An [`Attestation`] has no mutators and can
//! only be decoded through an integrity check, so any edit to the hashed fields
//! surfaces as [`MrvError::IntegrityMismatch`].

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_json, decimal, sha256_domain, sha256_domain_hex, timestamp};
use crate::emissions::EmissionsResult;
use crate::error::{MrvError, MrvResult};
use crate::reading::TelemetryReading;
use crate::scorer::AnomalyScore;

const DOMAIN_ATTESTATION_V1: &[u8] = b"mrv:attestation:v1";
const DOMAIN_SIGNATURE_V1: &[u8] = b"mrv:attestation-signature:v1";

pub const ATTESTATION_SCHEMA_V1: &str = "mrv.v1.attestation";

#[derive(Serialize)]
struct CanonicalReading<'a> {
    device_id: &'a str,
    timestamp_utc: String,
    generated_kwh: String,
    grid_emission_factor: String,
}

#[derive(Serialize)]
struct CanonicalEmissions {
    baseline_emissions_kg: String,
    project_emissions_kg: String,
    net_reduction_kg: String,
}

#[derive(Serialize)]
struct CanonicalAnomaly {
    value: String,
    is_anomalous: bool,
}

#[derive(Serialize)]
struct CanonicalBody<'a> {
    schema: &'static str,
    reading: CanonicalReading<'a>,
    emissions: CanonicalEmissions,
    anomaly: CanonicalAnomaly,
}

/// Hex SHA-256 over the domain-separated canonical body.
pub fn content_hash(
    reading: &TelemetryReading,
    emissions: &EmissionsResult,
    anomaly: &AnomalyScore,
) -> MrvResult<String> {
    let body = CanonicalBody {
        schema: ATTESTATION_SCHEMA_V1,
        reading: CanonicalReading {
            device_id: &reading.device_id,
            timestamp_utc: timestamp(&reading.timestamp_utc),
            generated_kwh: decimal("reading.generated_kwh", reading.generated_kwh)?,
            grid_emission_factor: decimal(
                "reading.grid_emission_factor",
                reading.grid_emission_factor,
            )?,
        },
        emissions: CanonicalEmissions {
            baseline_emissions_kg: decimal(
                "emissions.baseline_emissions_kg",
                emissions.baseline_emissions_kg,
            )?,
            project_emissions_kg: decimal(
                "emissions.project_emissions_kg",
                emissions.project_emissions_kg,
            )?,
            net_reduction_kg: decimal("emissions.net_reduction_kg", emissions.net_reduction_kg)?,
        },
        anomaly: CanonicalAnomaly {
            value: decimal("anomaly.value", anomaly.value)?,
            is_anomalous: anomaly.is_anomalous,
        },
    };
    Ok(sha256_domain_hex(
        DOMAIN_ATTESTATION_V1,
        &canonical_json(&body)?,
    ))
}

fn check_anomaly_range(anomaly: &AnomalyScore) -> MrvResult<()> {
    if !(0.0..=1.0).contains(&anomaly.value) {
        return Err(MrvError::invalid_input("anomaly.value", anomaly.value));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AttestationWire")]
pub struct Attestation {
    reading: TelemetryReading,
    emissions: EmissionsResult,
    anomaly: AnomalyScore,
    content_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct AttestationWire {
    reading: TelemetryReading,
    emissions: EmissionsResult,
    anomaly: AnomalyScore,
    content_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AttestationWire> for Attestation {
    type Error = MrvError;

    fn try_from(wire: AttestationWire) -> Result<Self, Self::Error> {
        let actual = content_hash(&wire.reading, &wire.emissions, &wire.anomaly)?;
        check_anomaly_range(&wire.anomaly)?;
        if actual != wire.content_hash {
            return Err(MrvError::IntegrityMismatch {
                expected: wire.content_hash,
                actual,
            });
        }
        Ok(Self {
            reading: wire.reading,
            emissions: wire.emissions,
            anomaly: wire.anomaly,
            content_hash: actual,
            created_at: wire.created_at,
        })
    }
}

impl Attestation {
    pub fn build(
        reading: TelemetryReading,
        emissions: EmissionsResult,
        anomaly: AnomalyScore,
    ) -> MrvResult<Self> {
        Self::build_at(reading, emissions, anomaly, Utc::now())
    }

    pub fn build_at(
        reading: TelemetryReading,
        emissions: EmissionsResult,
        anomaly: AnomalyScore,
        created_at: DateTime<Utc>,
    ) -> MrvResult<Self> {
        let content_hash = content_hash(&reading, &emissions, &anomaly)?;
        check_anomaly_range(&anomaly)?;
        Ok(Self {
            reading,
            emissions,
            anomaly,
            content_hash,
            created_at,
        })
    }

    pub fn reading(&self) -> &TelemetryReading {
        &self.reading
    }

    pub fn emissions(&self) -> &EmissionsResult {
        &self.emissions
    }

    pub fn anomaly(&self) -> &AnomalyScore {
        &self.anomaly
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn verify_integrity(&self) -> MrvResult<()> {
        let actual = content_hash(&self.reading, &self.emissions, &self.anomaly)?;
        if actual != self.content_hash {
            return Err(MrvError::IntegrityMismatch {
                expected: self.content_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn to_json_bytes(&self) -> MrvResult<Vec<u8>> {
        canonical_json(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> MrvResult<Self> {
        let wire: AttestationWire = serde_json::from_slice(bytes)
            .map_err(|e| MrvError::serialization("attestation", e.to_string()))?;
        Self::try_from(wire)
    }
}

fn signature_digest(
    attestation: &Attestation,
    signed_at: &DateTime<Utc>,
) -> MrvResult<[u8; 32]> {
    let hash = hex::decode(&attestation.content_hash)
        .map_err(|e| MrvError::serialization("content_hash", e.to_string()))?;
    let mut payload = Vec::with_capacity(hash.len() + 64);
    payload.extend_from_slice(&hash);
    payload.extend_from_slice(timestamp(&attestation.created_at).as_bytes());
    payload.push(0);
    payload.extend_from_slice(timestamp(signed_at).as_bytes());
    Ok(sha256_domain(DOMAIN_SIGNATURE_V1, &payload))
}

/// Holds the verifier's Ed25519 key and signs attestations.
pub struct AttestationSigner {
    signing_key: SigningKey,
}

impl std::fmt::Debug for AttestationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationSigner")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl AttestationSigner {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(secret))
    }

    pub fn from_secret_hex(secret_hex: &str) -> MrvResult<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|_| MrvError::InvalidConfig("signing key must be hex".into()))?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| MrvError::InvalidConfig("signing key must be 32 bytes".into()))?;
        Ok(Self::from_secret_bytes(&secret))
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, attestation: Attestation) -> MrvResult<SignedAttestation> {
        self.sign_at(attestation, Utc::now())
    }

    pub fn sign_at(
        &self,
        attestation: Attestation,
        signed_at: DateTime<Utc>,
    ) -> MrvResult<SignedAttestation> {
        let digest = signature_digest(&attestation, &signed_at)?;
        Ok(SignedAttestation {
            attestation,
            signature_hex: self.sign_digest(&digest),
            verifier_public_key_hex: self.public_key_hex(),
            signed_at,
        })
    }

    pub(crate) fn sign_digest(&self, digest: &[u8; 32]) -> String {
        hex::encode(self.signing_key.sign(digest).to_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedAttestation {
    pub attestation: Attestation,
    pub signature_hex: String,
    pub verifier_public_key_hex: String,
    pub signed_at: DateTime<Utc>,
}

impl SignedAttestation {
    /// Checks the signature against the embedded verifier key.
    pub fn verify_signature(&self) -> MrvResult<()> {
        self.verify_signature_with(&self.verifier_public_key_hex)
    }

    /// Checks the signature against a key the caller already trusts.
    pub fn verify_signature_with(&self, public_key_hex: &str) -> MrvResult<()> {
        self.attestation.verify_integrity()?;
        let digest = signature_digest(&self.attestation, &self.signed_at)?;
        verify_digest(public_key_hex, &digest, &self.signature_hex)
    }
}

/// Ed25519 check of a hex signature over `digest`; every failure, including
/// malformed key or signature encodings, is [`MrvError::SignatureInvalid`].
pub(crate) fn verify_digest(
    public_key_hex: &str,
    digest: &[u8; 32],
    signature_hex: &str,
) -> MrvResult<()> {
    let key_bytes: [u8; 32] = hex::decode(public_key_hex.trim())
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or(MrvError::SignatureInvalid)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| MrvError::SignatureInvalid)?;
    let sig_bytes = hex::decode(signature_hex).map_err(|_| MrvError::SignatureInvalid)?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| MrvError::SignatureInvalid)?;
    key.verify(digest, &signature).map_err(|_| MrvError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emissions;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, h, 0, 0).unwrap()
    }

    fn reading(kwh: f64) -> TelemetryReading {
        TelemetryReading::new("TURBINE-1", ts(12), kwh, 0.8)
    }

    fn attest(kwh: f64, anomaly: f64) -> Attestation {
        let r = reading(kwh);
        let e = emissions::compute(&r).unwrap();
        Attestation::build_at(r, e, AnomalyScore::from_value(anomaly, 0.5), ts(13)).unwrap()
    }

    fn signer() -> AttestationSigner {
        AttestationSigner::from_secret_bytes(&[7u8; 32])
    }

    #[test]
    fn hash_is_stable_for_identical_inputs() {
        let a = attest(1000.0, 0.1);
        let b = attest(1000.0, 0.1);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn created_at_is_not_hashed() {
        let r = reading(1000.0);
        let e = emissions::compute(&r).unwrap();
        let s = AnomalyScore::from_value(0.1, 0.5);
        let a = Attestation::build_at(r.clone(), e, s, ts(13)).unwrap();
        let b = Attestation::build_at(r, e, s, ts(14)).unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.created_at(), b.created_at());
    }

    #[test]
    fn every_hashed_field_changes_the_hash() {
        let base = attest(1000.0, 0.1);
        let r = base.reading().clone();
        let e = *base.emissions();
        let s = *base.anomaly();
        let reading_edits: [fn(&mut TelemetryReading); 4] = [
            |r| r.device_id = "TURBINE-2".into(),
            |r| r.timestamp_utc = ts(11),
            |r| r.generated_kwh = 1000.5,
            |r| r.grid_emission_factor = 0.81,
        ];
        for edit in reading_edits {
            let mut r2 = r.clone();
            edit(&mut r2);
            assert_ne!(content_hash(&r2, &e, &s).unwrap(), base.content_hash());
        }

        let emissions_edits: [fn(&mut EmissionsResult); 3] = [
            |e| e.baseline_emissions_kg = 801.0,
            |e| e.project_emissions_kg = 1.0,
            |e| e.net_reduction_kg = 799.0,
        ];
        for edit in emissions_edits {
            let mut e2 = e;
            edit(&mut e2);
            assert_ne!(content_hash(&r, &e2, &s).unwrap(), base.content_hash());
        }

        let anomaly_edits: [fn(&mut AnomalyScore); 2] =
            [|s| s.value = 0.2, |s| s.is_anomalous = true];
        for edit in anomaly_edits {
            let mut s2 = s;
            edit(&mut s2);
            assert_ne!(content_hash(&r, &e, &s2).unwrap(), base.content_hash());
        }
    }

    #[test]
    fn non_finite_inputs_fail_with_field_name() {
        let r = reading(1000.0);
        let e = emissions::compute(&r).unwrap();
        let err = Attestation::build(
            TelemetryReading {
                generated_kwh: f64::NAN,
                ..r.clone()
            },
            e,
            AnomalyScore::from_value(0.1, 0.5),
        )
        .expect_err("nan");
        assert!(matches!(
            err,
            MrvError::Serialization { ref field, .. } if field == "reading.generated_kwh"
        ));

        let err = Attestation::build(
            r,
            EmissionsResult {
                net_reduction_kg: f64::INFINITY,
                ..e
            },
            AnomalyScore::from_value(0.1, 0.5),
        )
        .expect_err("inf");
        assert!(matches!(
            err,
            MrvError::Serialization { ref field, .. } if field == "emissions.net_reduction_kg"
        ));
    }

    #[test]
    fn out_of_range_anomaly_is_rejected() {
        let r = reading(1000.0);
        let e = emissions::compute(&r).unwrap();
        let err = Attestation::build(r, e, AnomalyScore::from_value(1.2, 0.5)).expect_err("range");
        assert!(matches!(err, MrvError::InvalidInput { field: "anomaly.value", .. }));
    }

    #[test]
    fn json_round_trip_preserves_hash() {
        let a = attest(1234.567, 0.42);
        let bytes = a.to_json_bytes().unwrap();
        let back = Attestation::from_json_bytes(&bytes).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn tampered_json_is_detected() {
        let a = attest(1000.0, 0.1);
        let mut v: serde_json::Value = serde_json::from_slice(&a.to_json_bytes().unwrap()).unwrap();
        v["reading"]["generated_kwh"] = serde_json::json!(5000.0);
        let bytes = serde_json::to_vec(&v).unwrap();
        assert!(matches!(
            Attestation::from_json_bytes(&bytes),
            Err(MrvError::IntegrityMismatch { .. })
        ));
        assert!(serde_json::from_slice::<Attestation>(&bytes).is_err());
    }

    #[test]
    fn signature_verifies_and_detects_tampering() {
        let signed = signer().sign_at(attest(1000.0, 0.1), ts(14)).unwrap();
        signed.verify_signature().expect("valid signature");
        signed
            .verify_signature_with(&signer().public_key_hex())
            .expect("trusted key");

        let mut later = signed.clone();
        later.signed_at = ts(15);
        assert_eq!(later.verify_signature(), Err(MrvError::SignatureInvalid));

        let mut swapped = signed.clone();
        swapped.attestation = attest(1000.0, 0.2);
        assert_eq!(swapped.verify_signature(), Err(MrvError::SignatureInvalid));

        let other = AttestationSigner::from_secret_bytes(&[9u8; 32]);
        assert_eq!(
            signed.verify_signature_with(&other.public_key_hex()),
            Err(MrvError::SignatureInvalid)
        );
    }

    #[test]
    fn signer_rejects_malformed_secret() {
        assert!(AttestationSigner::from_secret_hex("zz").is_err());
        assert!(AttestationSigner::from_secret_hex("abcd").is_err());
        let hex_key = hex::encode([7u8; 32]);
        assert_eq!(
            AttestationSigner::from_secret_hex(&hex_key).unwrap().public_key_hex(),
            signer().public_key_hex()
        );
    }

    proptest! {
        #[test]
        fn any_kwh_change_changes_hash(kwh in 0.0f64..1.0e6, bump in 1u64..1_000) {
            let a = attest(kwh, 0.1);
            let bumped = f64::from_bits(kwh.to_bits() + bump);
            let r = TelemetryReading {
                generated_kwh: bumped,
                ..a.reading().clone()
            };
            let h = content_hash(&r, a.emissions(), a.anomaly()).unwrap();
            prop_assert_ne!(h, a.content_hash().to_string());
        }
    }
}
