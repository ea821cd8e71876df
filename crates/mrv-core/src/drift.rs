// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Feature drift between the training set and recent production readings,
//! via the two-sample Kolmogorov–Smirnov statistic with the asymptotic
//! `exp(-2λ²)` p-value approximation.

use serde::{Deserialize, Serialize};

use crate::error::{MrvError, MrvResult};
use crate::features::{self, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::reading::TelemetryReading;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsResult {
    pub statistic: f64,
    pub p_value: f64,
}

pub fn ks_two_sample(a: &[f64], b: &[f64]) -> MrvResult<KsResult> {
    if a.is_empty() {
        return Err(MrvError::invalid_input("sample_a.len", 0));
    }
    if b.is_empty() {
        return Err(MrvError::invalid_input("sample_b.len", 0));
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }

    let lambda = d * ((n1 * n2) / (n1 + n2)).sqrt();
    Ok(KsResult {
        statistic: d,
        p_value: (-2.0 * lambda * lambda).exp().min(1.0),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    pub statistic: f64,
    pub p_value: f64,
    pub drifted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub window_size: usize,
    pub features: Vec<FeatureDrift>,
    pub drifted: bool,
}

#[derive(Debug, Clone)]
pub struct DriftDetector {
    reference: Vec<FeatureVector>,
    alpha: f64,
}

impl DriftDetector {
    pub const DEFAULT_ALPHA: f64 = 0.05;

    pub fn from_training(training: &[TelemetryReading], alpha: f64) -> MrvResult<Self> {
        if training.is_empty() {
            return Err(MrvError::InsufficientTrainingData {
                required: 1,
                actual: 0,
            });
        }
        if !alpha.is_finite() || alpha <= 0.0 || alpha >= 1.0 {
            return Err(MrvError::InvalidConfig(format!("alpha={alpha} outside (0,1)")));
        }
        Ok(Self {
            reference: features::extract_series(training),
            alpha,
        })
    }

    pub fn check(&self, window: &[TelemetryReading]) -> MrvResult<DriftReport> {
        if window.is_empty() {
            return Err(MrvError::invalid_input("window.len", 0));
        }
        let current = features::extract_series(window);
        let mut out = Vec::with_capacity(FEATURE_COUNT);
        for (idx, name) in FEATURE_NAMES.iter().enumerate() {
            let reference: Vec<f64> = self.reference.iter().map(|x| x[idx]).collect();
            let observed: Vec<f64> = current.iter().map(|x| x[idx]).collect();
            let ks = ks_two_sample(&reference, &observed)?;
            out.push(FeatureDrift {
                feature: (*name).to_string(),
                statistic: ks.statistic,
                p_value: ks.p_value,
                drifted: ks.p_value < self.alpha,
            });
        }
        let drifted_features: Vec<&str> = out
            .iter()
            .filter(|f| f.drifted)
            .map(|f| f.feature.as_str())
            .collect();
        let drifted = !drifted_features.is_empty();
        if drifted {
            tracing::warn!(
                target: "mrv.scorer",
                window = window.len(),
                features = ?drifted_features,
                "telemetry drift detected; consider retraining"
            );
        }
        Ok(DriftReport {
            window_size: window.len(),
            features: out,
            drifted,
        })
    }
}
