//! Canned ports for application-level tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use crate::domain::Device;
use crate::ports::{
    BusError, BusPublisher, Notification, PathUpdate, SessionError, TelemetrySource, UpdateStream,
};

/// One scripted answer to a `subscribe_on_change` call
enum StreamScript {
    /// The subscribe call itself fails
    Refuse(SessionError),
    /// A finite stream of items, then the stream ends
    Serve(Vec<Result<Notification, SessionError>>),
}

/// Telemetry source serving canned notifications.
///
/// `get` answers from fixed per-host responses; hosts in the failure set
/// fail with a connect error. `subscribe_on_change` consumes one script
/// per call: a refusal, a stream that breaks, or a clean batch. With no
/// scripts left it hands out a stream that hangs forever, so workers sit
/// idle instead of spinning through resubscribes.
#[derive(Default)]
pub struct MockSource {
    responses: BTreeMap<String, Vec<Notification>>,
    failing: Vec<String>,
    streams: Mutex<BTreeMap<String, Vec<StreamScript>>>,
    subscribes: Mutex<BTreeMap<String, usize>>,
}

impl MockSource {
    pub fn with_response(mut self, hostname: &str, notifications: Vec<Notification>) -> Self {
        self.responses.insert(hostname.to_string(), notifications);
        self
    }

    pub fn with_failure(mut self, hostname: &str) -> Self {
        self.failing.push(hostname.to_string());
        self
    }

    pub fn with_stream(self, hostname: &str, batch: Vec<Notification>) -> Self {
        self.push_script(
            hostname,
            StreamScript::Serve(batch.into_iter().map(Ok).collect()),
        )
    }

    /// The next subscribe attempt for this host is refused outright
    pub fn with_stream_refusal(self, hostname: &str) -> Self {
        self.push_script(
            hostname,
            StreamScript::Refuse(SessionError::Connect {
                target: hostname.to_string(),
                reason: "connection refused".to_string(),
            }),
        )
    }

    /// A stream that delivers `batch`, then dies mid-read
    pub fn with_stream_break(self, hostname: &str, batch: Vec<Notification>) -> Self {
        let mut items: Vec<Result<Notification, SessionError>> =
            batch.into_iter().map(Ok).collect();
        items.push(Err(SessionError::Protocol("stream torn down".to_string())));
        self.push_script(hostname, StreamScript::Serve(items))
    }

    fn push_script(self, hostname: &str, script: StreamScript) -> Self {
        self.streams
            .lock()
            .unwrap()
            .entry(hostname.to_string())
            .or_default()
            .push(script);
        self
    }

    /// How many times `subscribe_on_change` was called for this host
    pub fn subscribe_calls(&self, hostname: &str) -> usize {
        self.subscribes
            .lock()
            .unwrap()
            .get(hostname)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TelemetrySource for MockSource {
    async fn get(&self, device: &Device) -> Result<Vec<Notification>, SessionError> {
        if self.failing.contains(&device.hostname) {
            return Err(SessionError::Connect {
                target: device.address.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self
            .responses
            .get(&device.hostname)
            .cloned()
            .unwrap_or_default())
    }

    async fn subscribe_on_change(&self, device: &Device) -> Result<UpdateStream, SessionError> {
        *self
            .subscribes
            .lock()
            .unwrap()
            .entry(device.hostname.clone())
            .or_insert(0) += 1;

        let script = {
            let mut streams = self.streams.lock().unwrap();
            streams.get_mut(&device.hostname).and_then(|queue| {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            })
        };

        match script {
            Some(StreamScript::Refuse(e)) => Err(e),
            Some(StreamScript::Serve(items)) => Ok(Box::pin(stream::iter(items))),
            None => Ok(Box::pin(stream::pending::<Result<Notification, SessionError>>())),
        }
    }
}

/// Bus publisher that records every message
#[derive(Default)]
pub struct MockBus {
    pub messages: Mutex<Vec<(String, String, Vec<u8>)>>,
    failing: bool,
}

impl MockBus {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failing: true,
        }
    }
}

#[async_trait]
impl BusPublisher for MockBus {
    async fn ensure_channel(&self, _channel: &str) -> Result<(), BusError> {
        Ok(())
    }

    async fn publish(&self, channel: &str, key: &str, payload: &[u8]) -> Result<(), BusError> {
        if self.failing {
            return Err(BusError::Publish {
                channel: channel.to_string(),
                reason: "broker down".to_string(),
            });
        }
        self.messages
            .lock()
            .unwrap()
            .push((channel.to_string(), key.to_string(), payload.to_vec()));
        Ok(())
    }
}

pub fn update(path: &str, value: Value) -> PathUpdate {
    PathUpdate {
        path: path.to_string(),
        value: Some(value),
    }
}

/// A notification carrying one interface-root update
pub fn interface_notification(interface: &str, value: Value, timestamp: i64) -> Notification {
    Notification {
        timestamp: Some(timestamp),
        updates: vec![update(&format!("interface[name={}]", interface), value)],
    }
}
