use serde::{Deserialize, Serialize};

/// A managed network device, resolved from the lab registry at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Short hostname (registry container names are stripped of lab prefixes)
    pub hostname: String,
    /// Management address, without any prefix length
    pub address: String,
    /// Interface names registered for this device in the topology
    pub interfaces: Vec<String>,
}

impl Device {
    pub fn new(
        hostname: impl Into<String>,
        address: impl Into<String>,
        interfaces: Vec<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            interfaces,
        }
    }

    /// Telemetry request paths covering exactly the registered interfaces
    pub fn interface_paths(&self) -> Vec<String> {
        self.interfaces
            .iter()
            .map(|name| format!("/interface[name={}]", name))
            .collect()
    }
}
