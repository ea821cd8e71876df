// Copyright [2026] [Joseph Verdicchio]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! mrv-core
//!
//! Measurement, reporting and verification (MRV) core for metered hydropower
//! generation.
//!
//! This crate implements the evidence pipeline:
//! - ACM0002 emissions calculation (baseline grid emissions minus project emissions)
//! - Isolation-forest anomaly scoring over telemetry features
//! - Content-hashed, Ed25519-signed attestations over canonical JSON
//! - A policy verifier producing approve/reject decisions with reason codes
//!
//! Nothing here performs network or disk I/O. Ledger submission and report
//! rendering live outside this crate and consume the serialized records.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod attestation;
pub mod canonical;
pub mod drift;
pub mod emissions;
pub mod error;
pub mod evidence;
pub mod features;
pub mod forest;
pub mod reading;
pub mod scorer;
pub mod store;
pub mod synthetic;
pub mod verifier;

pub use crate::attestation::{Attestation, AttestationSigner, SignedAttestation};
pub use crate::emissions::EmissionsResult;
pub use crate::error::{MrvError, MrvResult};
pub use crate::evidence::EvidenceRecord;
pub use crate::reading::TelemetryReading;
pub use crate::scorer::{AnomalyScore, AnomalyScorer, ScorerConfig};
pub use crate::verifier::{ReasonCode, VerificationDecision, VerificationPolicy, Verifier};
