// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Anomaly scorer: an owned, explicitly trained isolation-forest model.
//!
//! Training replaces the model under an exclusive write lock; scoring only
//! takes the shared read lock, so concurrent `score` calls never block each
//! other.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{MrvError, MrvResult};
use crate::features::{self, FeatureVector, FEATURE_NAMES};
use crate::forest::IsolationForest;
use crate::reading::TelemetryReading;

pub const MODEL_SCHEMA_V1: &str = "mrv.v1.isolation_forest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub tree_count: usize,
    pub subsample_size: usize,
    pub seed: u64,
    pub threshold: f64,
    pub min_training_samples: usize,
    /// When set, the threshold is recalibrated after training to the
    /// `1 - contamination` quantile of the training scores.
    pub contamination: Option<f64>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            tree_count: 100,
            subsample_size: 256,
            seed: 42,
            threshold: 0.5,
            min_training_samples: 10,
            contamination: None,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> MrvResult<()> {
        if self.tree_count == 0 {
            return Err(MrvError::InvalidConfig("tree_count must be > 0".into()));
        }
        if self.subsample_size < 2 {
            return Err(MrvError::InvalidConfig("subsample_size must be >= 2".into()));
        }
        if self.min_training_samples < 2 {
            return Err(MrvError::InvalidConfig(
                "min_training_samples must be >= 2".into(),
            ));
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(MrvError::InvalidConfig(format!(
                "threshold={} outside [0,1]",
                self.threshold
            )));
        }
        if let Some(c) = self.contamination {
            if !c.is_finite() || c <= 0.0 || c >= 1.0 {
                return Err(MrvError::InvalidConfig(format!(
                    "contamination={c} outside (0,1)"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub value: f64,
    pub is_anomalous: bool,
}

impl AnomalyScore {
    pub fn from_value(value: f64, threshold: f64) -> Self {
        Self {
            value,
            is_anomalous: value > threshold,
        }
    }
}

/// Persistable trained state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    pub schema: String,
    pub forest: IsolationForest,
    pub threshold: f64,
    pub trained_on: usize,
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
    pub feature_names: Vec<String>,
}

impl ForestModel {
    pub fn validate(&self) -> MrvResult<()> {
        if self.schema != MODEL_SCHEMA_V1 {
            return Err(MrvError::InvalidConfig(format!(
                "unsupported model schema {}",
                self.schema
            )));
        }
        if self.feature_names != FEATURE_NAMES {
            return Err(MrvError::InvalidConfig(format!(
                "model features {:?} do not match {:?}",
                self.feature_names, FEATURE_NAMES
            )));
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(MrvError::InvalidConfig(format!(
                "model threshold={} outside [0,1]",
                self.threshold
            )));
        }
        self.forest.validate()
    }

    pub fn to_json_bytes(&self) -> MrvResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| MrvError::serialization("model", e.to_string()))
    }

    pub fn from_json_bytes(bytes: &[u8]) -> MrvResult<Self> {
        let model: Self = serde_json::from_slice(bytes)
            .map_err(|e| MrvError::serialization("model", e.to_string()))?;
        model.validate()?;
        Ok(model)
    }
}

#[derive(Debug)]
pub struct AnomalyScorer {
    config: ScorerConfig,
    model: RwLock<Option<ForestModel>>,
}

impl AnomalyScorer {
    pub fn new(config: ScorerConfig) -> MrvResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model: RwLock::new(None),
        })
    }

    pub fn from_model(config: ScorerConfig, model: ForestModel) -> MrvResult<Self> {
        let scorer = Self::new(config)?;
        scorer.load_model(model)?;
        Ok(scorer)
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().is_some()
    }

    pub fn train(&self, historical: &[TelemetryReading]) -> MrvResult<()> {
        if historical.len() < self.config.min_training_samples {
            return Err(MrvError::InsufficientTrainingData {
                required: self.config.min_training_samples,
                actual: historical.len(),
            });
        }
        for reading in historical {
            reading.validate()?;
        }

        let samples = features::extract_series(historical);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let forest = IsolationForest::fit(
            &samples,
            self.config.tree_count,
            self.config.subsample_size,
            &mut rng,
        );
        let threshold = match self.config.contamination {
            Some(contamination) => calibrate_threshold(&forest, &samples, contamination),
            None => self.config.threshold,
        };

        let model = ForestModel {
            schema: MODEL_SCHEMA_V1.to_string(),
            forest,
            threshold,
            trained_on: samples.len(),
            trained_at: Utc::now(),
            seed: self.config.seed,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        };
        tracing::info!(
            target: "mrv.scorer",
            trained_on = model.trained_on,
            trees = self.config.tree_count,
            subsample = model.forest.subsample_size(),
            threshold = model.threshold,
            "anomaly model trained"
        );
        *self.model.write() = Some(model);
        Ok(())
    }

    pub fn load_model(&self, model: ForestModel) -> MrvResult<()> {
        model.validate()?;
        tracing::debug!(
            target: "mrv.scorer",
            trained_on = model.trained_on,
            "anomaly model loaded"
        );
        *self.model.write() = Some(model);
        Ok(())
    }

    pub fn export_model(&self) -> MrvResult<ForestModel> {
        self.model.read().clone().ok_or(MrvError::ModelNotTrained)
    }

    pub fn threshold(&self) -> MrvResult<f64> {
        self.model
            .read()
            .as_ref()
            .map(|m| m.threshold)
            .ok_or(MrvError::ModelNotTrained)
    }

    /// Scores a reading without history; the delta feature is taken as zero.
    pub fn score(&self, reading: &TelemetryReading) -> MrvResult<AnomalyScore> {
        self.score_with_previous(reading, None)
    }

    pub fn score_with_previous(
        &self,
        reading: &TelemetryReading,
        previous: Option<&TelemetryReading>,
    ) -> MrvResult<AnomalyScore> {
        let guard = self.model.read();
        let model = guard.as_ref().ok_or(MrvError::ModelNotTrained)?;
        if !reading.generated_kwh.is_finite() {
            return Err(MrvError::invalid_input("generated_kwh", reading.generated_kwh));
        }
        let x = features::extract(reading, previous);
        let score = AnomalyScore::from_value(model.forest.score(&x), model.threshold);
        if score.is_anomalous {
            tracing::debug!(
                target: "mrv.scorer",
                device_id = %reading.device_id,
                value = score.value,
                threshold = model.threshold,
                "reading scored anomalous"
            );
        }
        Ok(score)
    }

    /// Raw scores for feature vectors already extracted, e.g. by drift checks.
    pub fn score_features(&self, xs: &[FeatureVector]) -> MrvResult<Vec<f64>> {
        let guard = self.model.read();
        let model = guard.as_ref().ok_or(MrvError::ModelNotTrained)?;
        Ok(xs.iter().map(|x| model.forest.score(x)).collect())
    }
}

fn calibrate_threshold(
    forest: &IsolationForest,
    samples: &[FeatureVector],
    contamination: f64,
) -> f64 {
    let mut scores: Vec<f64> = samples.iter().map(|x| forest.score(x)).collect();
    scores.sort_by(f64::total_cmp);
    let idx = ((scores.len() as f64) * (1.0 - contamination)).floor() as usize;
    scores
        .get(idx.min(scores.len().saturating_sub(1)))
        .copied()
        .unwrap_or(0.5)
}
