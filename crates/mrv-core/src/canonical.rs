// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Canonical encodings used for content hashing.
//!
//! Objects are emitted with lexicographically sorted keys. Floats never reach
//! the JSON number grammar: [`decimal`] renders them as plain decimal strings
//! (shortest exact round-trip digits, no exponent) so the hash does not depend
//! on a JSON library's float formatting.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{MrvError, MrvResult};

pub fn canonical_json(v: &impl Serialize) -> MrvResult<Vec<u8>> {
    let value = serde_json::to_value(v)
        .map_err(|e| MrvError::serialization("canonical_json", e.to_string()))?;
    let sorted = sort_json(value);
    serde_json::to_vec(&sorted)
        .map_err(|e| MrvError::serialization("canonical_json", e.to_string()))
}

fn sort_json(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, val) in entries {
                sorted.insert(k, sort_json(val));
            }
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json).collect()),
        other => other,
    }
}

pub fn decimal(field: &str, value: f64) -> MrvResult<String> {
    if !value.is_finite() {
        return Err(MrvError::serialization(
            field,
            format!("non-finite value {value}"),
        ));
    }
    if value == 0.0 {
        return Ok("0".to_string());
    }
    Ok(format!("{value}"))
}

pub fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn sha256_domain(domain: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(payload);
    hasher.finalize().into()
}

pub fn sha256_domain_hex(domain: &[u8], payload: &[u8]) -> String {
    hex::encode(sha256_domain(domain, payload))
}
