use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connect(String),

    #[error("publish to {channel} failed: {reason}")]
    Publish { channel: String, reason: String },
}

/// Port for the durable message-bus sink
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Verify or create the named channel. Called once at startup.
    async fn ensure_channel(&self, channel: &str) -> Result<(), BusError>;

    /// Publish one payload to the channel, keyed for partitioning
    async fn publish(&self, channel: &str, key: &str, payload: &[u8]) -> Result<(), BusError>;
}
