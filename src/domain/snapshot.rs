use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use super::path::UpdatePath;
use super::value::coerce;

/// Interface states for one device, keyed by interface name
pub type DeviceInterfaces = BTreeMap<String, InterfaceState>;

/// Per-device state for one cycle, keyed by hostname. `None` marks a
/// device whose collection failed this cycle.
pub type CycleData = BTreeMap<String, Option<DeviceInterfaces>>;

/// State of a single interface: the device-reported timestamp plus the
/// coerced attribute tree. Serialized flat, with the timestamp as a
/// `timestamp` sibling of the attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterfaceState {
    /// Device-supplied report timestamp, nanosecond epoch
    #[serde(rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub report_timestamp: Option<i64>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl InterfaceState {
    /// Merge one path update into this interface's attribute tree.
    ///
    /// With a field path the coerced value is written at that nested
    /// location, creating intermediate objects on the way. Without one,
    /// an object value is merged key-by-key into the root and a scalar
    /// is stored under the reserved `"value"` key.
    pub fn apply(&mut self, path: &UpdatePath, value: Value, timestamp: Option<i64>) {
        if timestamp.is_some() {
            self.report_timestamp = timestamp;
        }

        let coerced = coerce(value);
        if path.has_fields() {
            set_nested(&mut self.attributes, &path.field_path, coerced);
        } else {
            match coerced {
                Value::Object(incoming) => {
                    for (key, val) in incoming {
                        self.attributes.insert(key, val);
                    }
                }
                scalar => {
                    self.attributes.insert("value".to_string(), scalar);
                }
            }
        }
    }
}

/// Apply one path update to a device's interface map. Interfaces appear
/// on first update; the same rule serves one-shot replies and stream
/// deltas.
pub fn apply_update(
    interfaces: &mut DeviceInterfaces,
    path: &UpdatePath,
    value: Value,
    timestamp: Option<i64>,
) {
    interfaces
        .entry(path.interface.clone())
        .or_default()
        .apply(path, value, timestamp);
}

fn set_nested(map: &mut Map<String, Value>, keys: &[String], value: Value) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = map;
    for key in parents {
        let slot = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            // A scalar sat at an intermediate key; the deeper update wins.
            *slot = Value::Object(Map::new());
        }
        current = slot
            .as_object_mut()
            .expect("intermediate slot is always an object");
    }
    current.insert(last.clone(), value);
}

/// One sealed collection cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSnapshot {
    /// Wall-clock seal time, float epoch seconds
    pub collected_at: f64,
    pub data: CycleData,
}

impl CycleSnapshot {
    pub fn new(collected_at: f64, data: CycleData) -> Self {
        Self { collected_at, data }
    }
}

/// Current wall clock as float epoch seconds, microsecond precision
pub fn epoch_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
