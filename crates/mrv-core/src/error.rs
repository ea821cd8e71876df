// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type MrvResult<T> = Result<T, MrvError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MrvError {
    #[error("invalid input: {field}={value}")]
    InvalidInput { field: &'static str, value: String },

    #[error("anomaly model has not been trained")]
    ModelNotTrained,

    #[error("insufficient training data: need at least {required} readings, got {actual}")]
    InsufficientTrainingData { required: usize, actual: usize },

    #[error("serialization failed for {field}: {reason}")]
    Serialization { field: String, reason: String },

    #[error("content hash mismatch: expected {expected}, computed {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("decision approved={approved} contradicts reason code {reason_code}")]
    InconsistentDecision { approved: bool, reason_code: String },

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl MrvError {
    pub(crate) fn invalid_input(field: &'static str, value: impl ToString) -> Self {
        Self::InvalidInput {
            field,
            value: value.to_string(),
        }
    }

    pub(crate) fn serialization(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Serialization {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
