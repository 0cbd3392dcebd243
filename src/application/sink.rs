use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::domain::{CycleSnapshot, Device, StatsRecord};
use crate::ports::{BusError, BusPublisher};

/// Events pushed to connected WebSocket clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Served cycle, with the cycle data pre-encoded as a JSON string
    RouterData { value: String },
    /// Seal times of every buffered cycle, oldest first
    AvailableTimestamps { values: Vec<f64> },
    TimemachineStats(StatsRecord),
    Error { message: String },
}

/// Fans a served cycle out to live subscribers and, when configured, the
/// durable bus. Lossy by design on the broadcast side: a send with no
/// subscribers or a lagging subscriber is not an error.
pub struct SinkDispatcher {
    events: broadcast::Sender<OutboundEvent>,
    bus: Option<Arc<dyn BusPublisher>>,
    channel: String,
    /// Management addresses by hostname, for the bus records
    addresses: BTreeMap<String, String>,
}

impl SinkDispatcher {
    pub fn new(
        events: broadcast::Sender<OutboundEvent>,
        bus: Option<Arc<dyn BusPublisher>>,
        channel: impl Into<String>,
        devices: &[Device],
    ) -> Self {
        let addresses = devices
            .iter()
            .map(|d| (d.hostname.clone(), d.address.clone()))
            .collect();
        Self {
            events,
            bus,
            channel: channel.into(),
            addresses,
        }
    }

    /// Broadcast a cycle and the buffered seal times to live subscribers
    pub fn broadcast_cycle(
        &self,
        snapshot: &CycleSnapshot,
        timestamps: Vec<f64>,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_string(&snapshot.data)?;
        let _ = self.events.send(OutboundEvent::RouterData { value });
        let _ = self
            .events
            .send(OutboundEvent::AvailableTimestamps { values: timestamps });
        Ok(())
    }

    pub fn emit_stats(&self, record: StatsRecord) {
        let _ = self.events.send(OutboundEvent::TimemachineStats(record));
    }

    pub fn emit_error(&self, message: &str) {
        let _ = self.events.send(OutboundEvent::Error {
            message: message.to_string(),
        });
    }

    /// Publish one flattened record per interface to the durable bus,
    /// keyed by hostname. Failed devices are skipped; no-op without a bus.
    pub async fn publish_cycle(&self, snapshot: &CycleSnapshot) -> Result<(), BusError> {
        let Some(bus) = &self.bus else {
            return Ok(());
        };

        let collected = iso_timestamp(snapshot.collected_at);
        for (hostname, device) in &snapshot.data {
            let Some(interfaces) = device else {
                continue;
            };
            let ip = self.addresses.get(hostname).cloned().unwrap_or_default();

            for (interface_name, state) in interfaces {
                let record = BusRecord {
                    timestamp: &collected,
                    hostname,
                    ip: &ip,
                    interface_name,
                    interface_timestamp: state.report_timestamp,
                    interface_data: flatten_attributes(&state.attributes),
                };
                let payload = serde_json::to_vec(&record).map_err(|e| BusError::Publish {
                    channel: self.channel.clone(),
                    reason: e.to_string(),
                })?;
                bus.publish(&self.channel, hostname, &payload).await?;
            }
        }
        Ok(())
    }
}

/// One durable-bus message: a single interface's state in one cycle
#[derive(Debug, Serialize)]
struct BusRecord<'a> {
    /// Cycle seal time, RFC 3339
    timestamp: &'a str,
    hostname: &'a str,
    ip: &'a str,
    interface_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    interface_timestamp: Option<i64>,
    interface_data: Map<String, Value>,
}

/// Flatten a nested attribute tree into underscore-joined keys
/// (`statistics_in-octets`); array elements flatten by index.
pub fn flatten_attributes(attributes: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in attributes {
        flatten_into(&mut flat, key, value);
    }
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(flat, &format!("{}_{}", prefix, key), child);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(flat, &format!("{}_{}", prefix, index), child);
            }
        }
        leaf => {
            flat.insert(prefix.to_string(), leaf.clone());
        }
    }
}

fn iso_timestamp(epoch_seconds: f64) -> String {
    DateTime::<Utc>::from_timestamp_micros((epoch_seconds * 1_000_000.0) as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
