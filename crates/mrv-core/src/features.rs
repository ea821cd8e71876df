// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::Timelike;

use crate::reading::TelemetryReading;

pub const FEATURE_COUNT: usize = 3;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["generated_kwh", "hour_of_day", "kwh_delta"];

pub type FeatureVector = [f64; FEATURE_COUNT];

/// `previous` only contributes when it belongs to the same device and precedes
/// `reading`; otherwise the delta feature is zero.
pub fn extract(reading: &TelemetryReading, previous: Option<&TelemetryReading>) -> FeatureVector {
    let ts = reading.timestamp_utc;
    let hour = f64::from(ts.hour())
        + f64::from(ts.minute()) / 60.0
        + f64::from(ts.second()) / 3600.0;
    let delta = previous
        .filter(|p| p.device_id == reading.device_id && p.timestamp_utc < ts)
        .map(|p| reading.generated_kwh - p.generated_kwh)
        .unwrap_or(0.0);
    [reading.generated_kwh, hour, delta]
}

/// Features for a batch of readings, chaining each device's readings in
/// timestamp order. Output is index-aligned with the input.
pub fn extract_series(readings: &[TelemetryReading]) -> Vec<FeatureVector> {
    let mut order: Vec<usize> = (0..readings.len()).collect();
    order.sort_by(|&a, &b| {
        readings[a]
            .device_id
            .cmp(&readings[b].device_id)
            .then(readings[a].timestamp_utc.cmp(&readings[b].timestamp_utc))
    });

    let mut out = vec![[0.0; FEATURE_COUNT]; readings.len()];
    let mut previous: Option<&TelemetryReading> = None;
    for idx in order {
        let current = &readings[idx];
        out[idx] = extract(current, previous);
        previous = Some(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn r(device: &str, h: u32, m: u32, kwh: f64) -> TelemetryReading {
        TelemetryReading::new(
            device,
            Utc.with_ymd_and_hms(2026, 1, 15, h, m, 0).unwrap(),
            kwh,
            0.8,
        )
    }

    #[test]
    fn hour_of_day_is_fractional() {
        let f = extract(&r("A", 13, 30, 10.0), None);
        assert_eq!(f, [10.0, 13.5, 0.0]);
    }

    #[test]
    fn delta_ignores_other_devices_and_later_readings() {
        let cur = r("A", 10, 0, 120.0);
        assert_eq!(extract(&cur, Some(&r("A", 9, 0, 100.0)))[2], 20.0);
        assert_eq!(extract(&cur, Some(&r("B", 9, 0, 100.0)))[2], 0.0);
        assert_eq!(extract(&cur, Some(&r("A", 11, 0, 100.0)))[2], 0.0);
    }

    #[test]
    fn series_chains_per_device_and_keeps_input_order() {
        let readings = vec![
            r("B", 2, 0, 50.0),
            r("A", 1, 0, 100.0),
            r("A", 0, 0, 90.0),
            r("B", 1, 0, 40.0),
        ];
        let f = extract_series(&readings);
        assert_eq!(f[0][2], 10.0);
        assert_eq!(f[1][2], 10.0);
        assert_eq!(f[2][2], 0.0);
        assert_eq!(f[3][2], 0.0);
        assert_eq!(f[1][0], 100.0);
    }
}
