// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::Path;

use anyhow::Context;
use mrv_core::scorer::ScorerConfig;
use mrv_core::verifier::VerificationPolicy;
use serde::{Deserialize, Serialize};

/// Layered CLI configuration: defaults, then `--config` file, then `MRV_*`
/// environment overrides, then explicit flags applied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub scorer: ScorerConfig,
    pub policy: VerificationPolicy,
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        self.scorer.tree_count = read_env_usize("MRV_TREE_COUNT", self.scorer.tree_count);
        self.scorer.subsample_size =
            read_env_usize("MRV_SUBSAMPLE_SIZE", self.scorer.subsample_size);
        self.scorer.seed = read_env_u64("MRV_SEED", self.scorer.seed);
        self.policy.anomaly_threshold =
            read_env_f64("MRV_ANOMALY_THRESHOLD", self.policy.anomaly_threshold);
        self.policy.max_plausible_kwh_per_reading = read_env_f64(
            "MRV_MAX_PLAUSIBLE_KWH",
            self.policy.max_plausible_kwh_per_reading,
        );
        self.policy.max_reading_age_seconds =
            read_env_u64("MRV_MAX_READING_AGE_SECONDS", self.policy.max_reading_age_seconds);
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.scorer.validate().context("invalid scorer config")?;
        self.policy.validate().context("invalid verification policy")?;
        Ok(())
    }
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    positive(std::env::var(name).ok().as_deref(), default)
}

fn read_env_usize(name: &str, default: usize) -> usize {
    positive(std::env::var(name).ok().as_deref(), default)
}

fn read_env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(default)
}

fn positive<T>(raw: Option<&str>, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.and_then(|v| v.parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}
