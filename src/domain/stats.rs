use std::time::Duration;

use serde::Serialize;

use super::snapshot::CycleSnapshot;

/// Collection-quality statistics for one served cycle.
///
/// Durations and timestamps are all milliseconds; the field names are the
/// wire contract for the `timemachine_stats` event. Replayed cycles carry
/// no cycle-start or poll timing, so those fields are optional.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRecord {
    /// Seal time of the served cycle, ms epoch
    pub general_timestamp_ms: f64,
    /// Devices present in the cycle, failed ones included
    pub host_count: usize,
    /// Sample standard deviation of the interface report timestamps
    pub deviation_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_timestamp_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_starttime_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_duration_ms: Option<f64>,
}

/// Score a sealed cycle. Pure; absent inputs yield absent fields.
pub fn score(
    snapshot: &CycleSnapshot,
    cycle_start: Option<f64>,
    poll_duration: Option<Duration>,
) -> StatsRecord {
    let timestamps_ms: Vec<f64> = snapshot
        .data
        .values()
        .filter_map(|device| device.as_ref())
        .flat_map(|interfaces| interfaces.values())
        .filter_map(|state| state.report_timestamp)
        .map(|ns| ns as f64 / 1_000_000.0)
        .collect();

    StatsRecord {
        general_timestamp_ms: snapshot.collected_at * 1000.0,
        host_count: snapshot.data.len(),
        deviation_ms: sample_stdev(&timestamps_ms),
        min_timestamp_ms: timestamps_ms.iter().copied().reduce(f64::min),
        cycle_starttime_ms: cycle_start.map(|s| s * 1000.0),
        cycle_duration_ms: cycle_start.map(|s| (snapshot.collected_at - s) * 1000.0),
        poll_duration_ms: poll_duration.map(|d| d.as_secs_f64() * 1000.0),
    }
}

/// Sample standard deviation (n - 1 denominator); fewer than two samples
/// yield 0.0.
pub fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::path::UpdatePath;
    use crate::domain::snapshot::{apply_update, CycleData, DeviceInterfaces};
    use serde_json::json;

    fn interfaces(entries: &[(&str, Option<i64>)]) -> DeviceInterfaces {
        let mut map = DeviceInterfaces::new();
        for (name, ts) in entries {
            apply_update(
                &mut map,
                &UpdatePath::parse(&format!("interface[name={}]/mtu", name)),
                json!(1500),
                *ts,
            );
        }
        map
    }

    #[test]
    fn test_stdev_of_fewer_than_two() {
        assert_eq!(sample_stdev(&[]), 0.0);
        assert_eq!(sample_stdev(&[5.0]), 0.0);
    }

    #[test]
    fn test_stdev_of_identical_samples() {
        assert_eq!(sample_stdev(&[3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn test_stdev_uses_sample_denominator() {
        // Sample stdev of {0, 2} is sqrt(2), not 1.
        let stdev = sample_stdev(&[0.0, 2.0]);
        assert!((stdev - std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_score_full_cycle() {
        let mut data = CycleData::new();
        // 1e9 ns = 1000 ms, 3e9 ns = 3000 ms.
        data.insert(
            "R1".to_string(),
            Some(interfaces(&[("eth0", Some(1_000_000_000))])),
        );
        data.insert(
            "R2".to_string(),
            Some(interfaces(&[("eth0", Some(3_000_000_000))])),
        );
        let snapshot = CycleSnapshot::new(100.5, data);

        let record = score(&snapshot, Some(100.0), Some(Duration::from_millis(420)));
        assert_eq!(record.general_timestamp_ms, 100_500.0);
        assert_eq!(record.host_count, 2);
        assert!((record.deviation_ms - 1_414.213_562_373_095).abs() < 1e-6);
        assert_eq!(record.min_timestamp_ms, Some(1000.0));
        assert_eq!(record.cycle_starttime_ms, Some(100_000.0));
        assert!((record.cycle_duration_ms.unwrap() - 500.0).abs() < 1e-9);
        assert_eq!(record.poll_duration_ms, Some(420.0));
    }

    #[test]
    fn test_score_skips_failed_devices_and_bare_interfaces() {
        let mut data = CycleData::new();
        data.insert("R1".to_string(), None);
        data.insert("R2".to_string(), Some(interfaces(&[("eth0", None)])));
        let snapshot = CycleSnapshot::new(7.0, data);

        let record = score(&snapshot, None, None);
        // Failed devices still count as hosts; no timestamps means no min.
        assert_eq!(record.host_count, 2);
        assert_eq!(record.deviation_ms, 0.0);
        assert_eq!(record.min_timestamp_ms, None);
        assert_eq!(record.cycle_starttime_ms, None);
        assert_eq!(record.cycle_duration_ms, None);
        assert_eq!(record.poll_duration_ms, None);
    }

    #[test]
    fn test_replay_serialization_omits_absent_fields() {
        let snapshot = CycleSnapshot::new(1.0, CycleData::new());
        let record = score(&snapshot, None, None);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(
            value,
            json!({
                "general_timestamp_ms": 1000.0,
                "host_count": 0,
                "deviation_ms": 0.0,
            })
        );
    }
}
