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

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod config;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use mrv_core::emissions;
use mrv_core::evidence::{EvidencePipeline, EvidenceRecord};
use mrv_core::reading::{FixedClock, TelemetryReading};
use mrv_core::scorer::{AnomalyScorer, ForestModel};
use mrv_core::synthetic::{SyntheticConfig, SyntheticGenerator};
use mrv_core::verifier::{VerificationPolicy, Verifier};
use mrv_core::AttestationSigner;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "mrvctl")]
#[command(about = "Train, attest and check hydro MRV evidence records")]
struct Cli {
    /// JSON file with `scorer` and `policy` sections.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a fresh hex-encoded Ed25519 signing key.
    Keygen {
        #[arg(long)]
        out: PathBuf,
    },
    /// Generate synthetic normal telemetry.
    Synth {
        #[arg(long, default_value_t = 100)]
        count: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 3)]
        devices: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Train an isolation forest and save the model.
    Train {
        #[arg(long, conflicts_with = "synthetic", required_unless_present = "synthetic")]
        readings: Option<PathBuf>,
        #[arg(long)]
        synthetic: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        trees: Option<usize>,
        #[arg(long)]
        subsample: Option<usize>,
        #[arg(long)]
        contamination: Option<f64>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Compute, score, build, verify and sign one reading.
    Attest {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        reading: PathBuf,
        #[arg(long)]
        signing_key: PathBuf,
        #[arg(long)]
        policy: Option<PathBuf>,
        #[arg(long)]
        previous: Option<PathBuf>,
        /// Verification instant (RFC3339); defaults to the system clock.
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Re-check the content hash and signatures of a persisted evidence record.
    VerifyEvidence {
        #[arg(long)]
        record: PathBuf,
        /// Trusted verifier key (hex); without it the record is only checked
        /// against the key it carries.
        #[arg(long)]
        public_key: Option<String>,
    },
    /// REC issuance and royalty split for an approved evidence record.
    Issuance {
        #[arg(long)]
        record: PathBuf,
        /// Trusted verifier key (hex) the record must be signed with.
        #[arg(long)]
        public_key: String,
        #[arg(long, default_value_t = 1.0)]
        ratio: f64,
        #[arg(long, default_value_t = 0.0)]
        royalty: f64,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .with_writer(std::io::stderr)
        .init();

    match run(cli.cmd, cli.config.as_deref()) {
        Ok(v) => println!("{v}"),
        Err(err) => {
            println!("{}", json!({"error": format!("{err:#}")}));
            std::process::exit(1);
        }
    }
}

fn run(cmd: Command, config_path: Option<&Path>) -> anyhow::Result<serde_json::Value> {
    match cmd {
        Command::Keygen { out } => keygen(&out),
        Command::Synth {
            count,
            seed,
            devices,
            out,
        } => synth(count, seed, devices, out.as_deref()),
        Command::Train {
            readings,
            synthetic,
            seed,
            trees,
            subsample,
            contamination,
            out,
        } => {
            let mut cfg = CliConfig::load(config_path)?;
            if let Some(seed) = seed {
                cfg.scorer.seed = seed;
            }
            if let Some(trees) = trees {
                cfg.scorer.tree_count = trees;
            }
            if let Some(subsample) = subsample {
                cfg.scorer.subsample_size = subsample;
            }
            if contamination.is_some() {
                cfg.scorer.contamination = contamination;
            }
            cfg.validate()?;
            let history = match (readings, synthetic) {
                (Some(path), _) => read_json::<Vec<TelemetryReading>>(&path)?,
                (None, Some(n)) => SyntheticGenerator::new(SyntheticConfig {
                    seed: cfg.scorer.seed,
                    ..SyntheticConfig::default()
                })
                .normal_series(n),
                (None, None) => bail!("one of --readings or --synthetic is required"),
            };
            train(cfg, &history, &out)
        }
        Command::Attest {
            model,
            reading,
            signing_key,
            policy,
            previous,
            now,
            out,
        } => {
            let mut cfg = CliConfig::load(config_path)?;
            if let Some(path) = policy {
                cfg.policy = read_json::<VerificationPolicy>(&path)?;
            }
            cfg.validate()?;
            let reading = read_json::<TelemetryReading>(&reading)?;
            let previous = previous
                .map(|p| read_json::<TelemetryReading>(&p))
                .transpose()?;
            attest(
                cfg,
                &model,
                reading,
                previous.as_ref(),
                &signing_key,
                now.unwrap_or_else(Utc::now),
                out.as_deref(),
            )
        }
        Command::VerifyEvidence { record, public_key } => {
            let trusted = public_key.is_some();
            let record = read_record(&record, public_key.as_deref())?;
            Ok(json!({
                "valid": true,
                "trusted": trusted,
                "summary": record.summary(),
            }))
        }
        Command::Issuance {
            record,
            public_key,
            ratio,
            royalty,
        } => {
            let record = read_record(&record, Some(&public_key))?;
            let summary = record.summary();
            if !summary.approved {
                bail!(
                    "record {} was rejected ({}); no RECs are issued",
                    summary.content_hash,
                    summary.reason_code
                );
            }
            let issuance = emissions::rec_issuance(summary.net_reduction_tonnes, ratio)?;
            let split = emissions::royalty_split(issuance.recs_issued, royalty)?;
            Ok(json!({
                "content_hash": summary.content_hash,
                "methodology": summary.methodology,
                "issuance": issuance,
                "royalty": split,
            }))
        }
    }
}

fn keygen(out: &Path) -> anyhow::Result<serde_json::Value> {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    let signing_key = SigningKey::from_bytes(&secret);
    fs::write(out, hex::encode(signing_key.to_bytes()))
        .with_context(|| format!("writing signing key {}", out.display()))?;
    let signer = AttestationSigner::new(signing_key);
    Ok(json!({
        "signing_key_path": out.display().to_string(),
        "public_key_hex": signer.public_key_hex(),
    }))
}

fn synth(
    count: usize,
    seed: u64,
    devices: usize,
    out: Option<&Path>,
) -> anyhow::Result<serde_json::Value> {
    if devices == 0 {
        bail!("--devices must be > 0");
    }
    let readings = SyntheticGenerator::new(SyntheticConfig {
        seed,
        devices,
        ..SyntheticConfig::default()
    })
    .normal_series(count);
    match out {
        Some(path) => {
            write_json(path, &readings)?;
            Ok(json!({"count": readings.len(), "path": path.display().to_string()}))
        }
        None => Ok(serde_json::to_value(&readings)?),
    }
}

fn train(
    cfg: CliConfig,
    history: &[TelemetryReading],
    out: &Path,
) -> anyhow::Result<serde_json::Value> {
    let scorer = AnomalyScorer::new(cfg.scorer)?;
    scorer.train(history)?;
    let model = scorer.export_model()?;
    fs::write(out, model.to_json_bytes()?)
        .with_context(|| format!("writing model {}", out.display()))?;
    Ok(json!({
        "model_path": out.display().to_string(),
        "trained_on": model.trained_on,
        "tree_count": model.forest.trees().len(),
        "subsample_size": model.forest.subsample_size(),
        "threshold": model.threshold,
    }))
}

fn attest(
    cfg: CliConfig,
    model_path: &Path,
    reading: TelemetryReading,
    previous: Option<&TelemetryReading>,
    signing_key: &Path,
    now: DateTime<Utc>,
    out: Option<&Path>,
) -> anyhow::Result<serde_json::Value> {
    let model_bytes =
        fs::read(model_path).with_context(|| format!("reading model {}", model_path.display()))?;
    let model = ForestModel::from_json_bytes(&model_bytes)
        .with_context(|| format!("loading model {}", model_path.display()))?;
    let scorer = AnomalyScorer::from_model(cfg.scorer, model)?;
    let verifier = Verifier::with_clock(cfg.policy, FixedClock(now))?;
    let secret = fs::read_to_string(signing_key)
        .with_context(|| format!("reading signing key {}", signing_key.display()))?;
    let signer = AttestationSigner::from_secret_hex(secret.trim())?;

    let record = EvidencePipeline::new(&scorer, &verifier, &signer).process(reading, previous)?;
    if let Some(path) = out {
        fs::write(path, record.to_json_bytes()?)
            .with_context(|| format!("writing evidence record {}", path.display()))?;
    }
    tracing::info!(
        attestation_hash = %record.decision.attestation_hash,
        approved = record.decision.approved,
        "evidence record produced"
    );
    Ok(serde_json::to_value(&record)?)
}

fn read_record(path: &Path, public_key: Option<&str>) -> anyhow::Result<EvidenceRecord> {
    let bytes = fs::read(path).with_context(|| format!("reading record {}", path.display()))?;
    let record = match public_key {
        Some(key) => EvidenceRecord::from_json_bytes_with_key(&bytes, key),
        None => EvidenceRecord::from_json_bytes(&bytes),
    };
    record.with_context(|| format!("checking record {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}
