// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::attestation::Attestation;
use crate::error::{MrvError, MrvResult};
use crate::verifier::{VerificationDecision, VerificationState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAttestation {
    pub attestation: Attestation,
    pub state: VerificationState,
    pub decision: Option<VerificationDecision>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    /// Approved share of decided attestations; 0 when nothing is decided yet.
    pub approval_rate: f64,
}

/// Attestations keyed by content hash, each tracking its verification state.
#[derive(Debug, Default)]
pub struct InMemoryAttestationStore {
    inner: RwLock<BTreeMap<String, StoredAttestation>>,
}

impl InMemoryAttestationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserting the same content twice is a no-op returning the same hash.
    pub fn insert(&self, attestation: Attestation) -> MrvResult<String> {
        attestation.verify_integrity()?;
        let hash = attestation.content_hash().to_string();
        let mut inner = self.inner.write();
        inner
            .entry(hash.clone())
            .or_insert_with(|| StoredAttestation {
                attestation,
                state: VerificationState::Pending,
                decision: None,
            });
        tracing::debug!(target: "mrv.store", attestation_hash = %hash, "attestation stored");
        Ok(hash)
    }

    pub fn record_decision(&self, decision: VerificationDecision) -> MrvResult<VerificationState> {
        decision.validate()?;
        let mut inner = self.inner.write();
        let entry = inner
            .get_mut(&decision.attestation_hash)
            .ok_or_else(|| MrvError::NotFound(decision.attestation_hash.clone()))?;
        let next = entry.state.transition(decision.state())?;
        entry.state = next;
        entry.decision = Some(decision);
        Ok(next)
    }

    pub fn get(&self, hash: &str) -> Option<StoredAttestation> {
        self.inner.read().get(hash).cloned()
    }

    pub fn list(&self) -> Vec<StoredAttestation> {
        self.inner.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        let mut stats = StoreStats {
            total: inner.len(),
            pending: 0,
            approved: 0,
            rejected: 0,
            approval_rate: 0.0,
        };
        for entry in inner.values() {
            match entry.state {
                VerificationState::Pending => stats.pending += 1,
                VerificationState::Approved => stats.approved += 1,
                VerificationState::Rejected => stats.rejected += 1,
            }
        }
        let decided = stats.approved + stats.rejected;
        if decided > 0 {
            stats.approval_rate = stats.approved as f64 / decided as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emissions;
    use crate::reading::TelemetryReading;
    use crate::scorer::AnomalyScore;
    use crate::verifier::{verify, VerificationPolicy};
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn attest(kwh: f64, anomaly: f64) -> Attestation {
        let r = TelemetryReading::new("TURBINE-1", now(), kwh, 0.8);
        let e = emissions::compute(&r).unwrap();
        Attestation::build_at(r, e, AnomalyScore::from_value(anomaly, 0.5), now()).unwrap()
    }

    #[test]
    fn lifecycle_pending_to_decided() {
        let store = InMemoryAttestationStore::new();
        let a = attest(100.0, 0.1);
        let hash = store.insert(a.clone()).unwrap();
        assert_eq!(store.get(&hash).unwrap().state, VerificationState::Pending);

        let d = verify(&a, &VerificationPolicy::default(), now());
        assert_eq!(store.record_decision(d.clone()).unwrap(), VerificationState::Approved);
        let stored = store.get(&hash).unwrap();
        assert_eq!(stored.decision, Some(d.clone()));

        assert!(matches!(
            store.record_decision(d),
            Err(MrvError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn unknown_hash_is_not_found() {
        let store = InMemoryAttestationStore::new();
        let d = verify(&attest(100.0, 0.1), &VerificationPolicy::default(), now());
        assert!(matches!(store.record_decision(d), Err(MrvError::NotFound(_))));
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let store = InMemoryAttestationStore::new();
        let a = attest(100.0, 0.1);
        assert_eq!(store.insert(a.clone()).unwrap(), store.insert(a).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn stats_and_clear() {
        let store = InMemoryAttestationStore::new();
        let policy = VerificationPolicy::default();
        for (kwh, anomaly) in [(100.0, 0.1), (200.0, 0.1), (300.0, 0.1), (400.0, 0.9)] {
            let a = attest(kwh, anomaly);
            store.insert(a.clone()).unwrap();
            store.record_decision(verify(&a, &policy, now())).unwrap();
        }
        store.insert(attest(500.0, 0.1)).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved, 3);
        assert_eq!(stats.rejected, 1);
        assert!((stats.approval_rate - 0.75).abs() < 1e-12);
        assert_eq!(store.list().len(), 5);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.stats().approval_rate, 0.0);
    }
}
