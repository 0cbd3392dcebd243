use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use thiserror::Error;

use crate::domain::Device;

/// Failure of a telemetry session against one device. Every variant is
/// isolated to that device: one bad session never aborts a cycle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection to {target} failed: {reason}")]
    Connect { target: String, reason: String },

    #[error("authentication rejected by {target}")]
    Auth { target: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("stream closed by remote")]
    Closed,
}

/// One value update addressed by a telemetry path
#[derive(Debug, Clone, PartialEq)]
pub struct PathUpdate {
    pub path: String,
    /// Absent for delete-style updates, which carry no value
    pub value: Option<Value>,
}

/// A batch of updates sharing one device-reported timestamp
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    /// Nanosecond epoch, when the device supplied one
    pub timestamp: Option<i64>,
    pub updates: Vec<PathUpdate>,
}

pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<Notification, SessionError>> + Send>>;

/// Port for fetching device state over the telemetry protocol
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// One-shot state request covering the device's registered interfaces
    async fn get(&self, device: &Device) -> Result<Vec<Notification>, SessionError>;

    /// Open a persistent on-change subscription for the device's
    /// registered interfaces. The stream ends when the remote closes.
    async fn subscribe_on_change(&self, device: &Device) -> Result<UpdateStream, SessionError>;
}
