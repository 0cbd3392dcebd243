use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::domain::Device;
use crate::ports::{DeviceRegistry, RegistryError};

use super::topology::TopologyFile;

/// Container group that marks telemetry-capable devices
const ROUTER_GROUP: &str = "routers";

/// Device registry backed by the containerlab CLI and the topology file.
///
/// `clab inspect` supplies the management addresses of the running
/// containers; the topology file supplies the interfaces each device
/// carries. Only containers in the `routers` group become devices.
pub struct ClabRegistry {
    topology: TopologyFile,
}

impl ClabRegistry {
    pub fn new(topology: TopologyFile) -> Self {
        Self { topology }
    }

    /// Raw `clab inspect --format json` output
    pub async fn inspect(&self) -> Result<Value, RegistryError> {
        let output = Command::new("clab")
            .args(["inspect", "--format", "json"])
            .output()
            .await?;

        if !output.status.success() {
            return Err(RegistryError::CommandFailed {
                command: "clab inspect".to_string(),
                status: output.status.to_string(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    /// Management addresses of every router container, keyed by the short
    /// hostname. Handles both inspect layouts: lab-name keys mapping to
    /// container lists, and a flat `containers` list.
    pub fn router_addresses(inspect: &Value) -> BTreeMap<String, String> {
        let mut addresses = BTreeMap::new();
        let Some(labs) = inspect.as_object() else {
            return addresses;
        };

        for containers in labs.values() {
            let Some(containers) = containers.as_array() else {
                continue;
            };
            for container in containers {
                let group = container.get("group").and_then(Value::as_str);
                if group != Some(ROUTER_GROUP) {
                    continue;
                }
                let Some(name) = container.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let Some(address) = container.get("ipv4_address").and_then(Value::as_str) else {
                    debug!(name, "router container without ipv4 address");
                    continue;
                };

                let hostname = short_hostname(name);
                let address = strip_prefix_len(address);
                if !address.is_empty() {
                    addresses.insert(hostname.to_string(), address.to_string());
                }
            }
        }

        addresses
    }
}

/// Container names carry lab prefixes (`clab-lab1-R1`); the device goes by
/// the last dash segment.
fn short_hostname(name: &str) -> &str {
    name.rsplit('-').next().unwrap_or(name)
}

/// Inspect reports addresses in CIDR form (`172.20.20.2/24`)
fn strip_prefix_len(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}

#[async_trait]
impl DeviceRegistry for ClabRegistry {
    async fn devices(&self) -> Result<Vec<Device>, RegistryError> {
        let inspect = self.inspect().await?;
        let addresses = Self::router_addresses(&inspect);

        Ok(addresses
            .into_iter()
            .map(|(hostname, address)| {
                let interfaces = self.topology.interfaces_for(&hostname);
                Device::new(hostname, address, interfaces)
            })
            .collect())
    }
}
