use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ports::RegistryError;

/// A containerlab topology file, reduced to the sections we read
#[derive(Debug, Clone, Deserialize)]
pub struct TopologyFile {
    #[serde(default)]
    pub name: Option<String>,
    pub topology: TopologySection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologySection {
    #[serde(default)]
    pub kinds: BTreeMap<String, KindSpec>,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KindSpec {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// One wire between two `node:interface` endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct LinkSpec {
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl TopologyFile {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Derive the node/link graph served to UI clients. A node without its
    /// own image inherits the image of its kind.
    pub fn graph(&self) -> TopologyGraph {
        let nodes = self
            .topology
            .nodes
            .iter()
            .map(|(id, node)| {
                let image = node.image.clone().or_else(|| {
                    node.kind
                        .as_deref()
                        .and_then(|kind| self.topology.kinds.get(kind))
                        .and_then(|spec| spec.image.clone())
                });
                GraphNode {
                    id: id.clone(),
                    kind: node.kind.clone(),
                    image,
                }
            })
            .collect();

        let links = self
            .topology
            .links
            .iter()
            .filter_map(|link| {
                let source = split_endpoint(link.endpoints.first()?)?;
                let target = split_endpoint(link.endpoints.get(1)?)?;
                Some(GraphLink {
                    source: source.0,
                    source_interface: source.1,
                    target: target.0,
                    target_interface: target.1,
                })
            })
            .collect();

        TopologyGraph { nodes, links }
    }

    /// Interface names registered for a node, in link order
    pub fn interfaces_for(&self, name: &str) -> Vec<String> {
        let mut interfaces = Vec::new();
        for link in &self.topology.links {
            let Some(source) = link.endpoints.first().and_then(|e| split_endpoint(e)) else {
                continue;
            };
            let Some(target) = link.endpoints.get(1).and_then(|e| split_endpoint(e)) else {
                continue;
            };
            if source.0 == name {
                interfaces.push(source.1);
            } else if target.0 == name {
                interfaces.push(target.1);
            }
        }
        interfaces
    }
}

fn split_endpoint(endpoint: &str) -> Option<(String, String)> {
    match endpoint.split_once(':') {
        Some((node, interface)) => Some((node.to_string(), interface.to_string())),
        None => {
            warn!(endpoint, "skipping malformed link endpoint");
            None
        }
    }
}

/// Node/link view of the lab, serialized for the topology endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TopologyGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub source_interface: String,
    pub target_interface: String,
}
