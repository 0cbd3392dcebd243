use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Device;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("topology error: {0}")]
    Topology(#[from] serde_yaml::Error),
}

/// Port for resolving the managed device fleet
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Resolve hostname, management address and registered interfaces for
    /// every device. Called once at startup; the fleet is static afterwards.
    async fn devices(&self) -> Result<Vec<Device>, RegistryError>;
}
