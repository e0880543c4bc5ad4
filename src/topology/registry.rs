//! Static Node Registry
//!
//! Derives the fixed list of shards from declarative configuration, the way
//! members of an ordinal replica set (e.g. pods of a Kubernetes StatefulSet
//! behind a headless service) are addressed by index:
//!
//! ```text
//! kvstore-0.kvstore-hl.default.svc.cluster.local
//! kvstore-1.kvstore-hl.default.svc.cluster.local
//! ```
//!
//! Everything here runs once at startup. Any invalid setting is fatal.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

use super::types::{Node, NodeId};

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_PORT: u32 = 7000;
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
pub const DEFAULT_HOST_TEMPLATE: &str = "{nodeId}.{serviceName}.{namespace}.svc.{domain}";

static REPEATED_DOTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.{2,}").expect("separator pattern is valid"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("base name must not be empty")]
    MissingBaseName,
    #[error("service name must not be empty")]
    MissingServiceName,
    #[error("replica count must be at least 1, got {0}")]
    InvalidReplicaCount(usize),
    #[error("port must be between 1 and 65535, got {0}")]
    InvalidPort(u32),
    #[error("host template resolved to an empty host for node '{0}'")]
    EmptyHost(String),
    #[error("address '{address}' for node '{node}' is not a valid URL")]
    InvalidAddress { node: String, address: String },
    #[error("at least one node must be configured")]
    NoNodes,
    #[error("duplicate node identifier '{0}'")]
    DuplicateNodeId(String),
}

/// Declarative description of the shard set.
///
/// Supported template placeholders: `{nodeId}`, `{baseName}`,
/// `{serviceName}` (alias `{headlessServiceName}`), `{namespace}`,
/// `{domain}` (alias `{clusterDomain}`), `{replicaIndex}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyConfig {
    pub base_name: String,
    pub service_name: String,
    pub replica_count: usize,
    #[serde(default = "default_port")]
    pub port: u32,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,
    #[serde(default = "default_host_template")]
    pub host_template: String,
}

fn default_port() -> u32 {
    DEFAULT_PORT
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_cluster_domain() -> String {
    DEFAULT_CLUSTER_DOMAIN.to_string()
}

fn default_host_template() -> String {
    DEFAULT_HOST_TEMPLATE.to_string()
}

impl TopologyConfig {
    pub fn new(base_name: &str, service_name: &str, replica_count: usize) -> Self {
        Self {
            base_name: base_name.to_string(),
            service_name: service_name.to_string(),
            replica_count,
            port: DEFAULT_PORT,
            scheme: default_scheme(),
            namespace: default_namespace(),
            cluster_domain: default_cluster_domain(),
            host_template: default_host_template(),
        }
    }

    fn validate(&self) -> Result<(), TopologyError> {
        if self.base_name.trim().is_empty() {
            return Err(TopologyError::MissingBaseName);
        }
        if self.service_name.trim().is_empty() {
            return Err(TopologyError::MissingServiceName);
        }
        if self.replica_count < 1 {
            return Err(TopologyError::InvalidReplicaCount(self.replica_count));
        }
        if !(1..=65535).contains(&self.port) {
            return Err(TopologyError::InvalidPort(self.port));
        }
        Ok(())
    }

    fn resolve_host(&self, node_id: &str, index: usize) -> String {
        let host = self
            .host_template
            .replace("{nodeId}", node_id)
            .replace("{baseName}", self.base_name.trim())
            .replace("{serviceName}", self.service_name.trim())
            .replace("{headlessServiceName}", self.service_name.trim())
            .replace("{namespace}", self.namespace.trim())
            .replace("{domain}", self.cluster_domain.trim())
            .replace("{clusterDomain}", self.cluster_domain.trim())
            .replace("{replicaIndex}", &index.to_string());

        normalize_host(&host)
    }
}

/// Collapses repeated `.` separators and trims leading/trailing ones.
pub fn normalize_host(host: &str) -> String {
    REPEATED_DOTS
        .replace_all(host.trim(), ".")
        .trim_matches('.')
        .to_string()
}

/// The immutable set of shards, in replica-index order.
#[derive(Debug, Clone)]
pub struct NodeTopology {
    nodes: Vec<Node>,
}

impl NodeTopology {
    pub fn build(config: &TopologyConfig) -> Result<Self, TopologyError> {
        config.validate()?;

        let scheme = if config.scheme.trim().is_empty() {
            DEFAULT_SCHEME
        } else {
            config.scheme.trim()
        };

        let mut nodes = Vec::with_capacity(config.replica_count);
        for index in 0..config.replica_count {
            let node_id = format!("{}-{}", config.base_name.trim(), index);
            let host = config.resolve_host(&node_id, index);
            if host.is_empty() {
                return Err(TopologyError::EmptyHost(node_id));
            }

            let address = format!("{}://{}:{}/", scheme, host, config.port);
            if reqwest::Url::parse(&address).is_err() {
                return Err(TopologyError::InvalidAddress {
                    node: node_id,
                    address,
                });
            }

            nodes.push(Node::new(node_id, address));
        }

        Self::from_nodes(nodes)
    }

    /// Builds a topology from an explicit node list.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, TopologyError> {
        if nodes.is_empty() {
            return Err(TopologyError::NoNodes);
        }

        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(&node.id) {
                return Err(TopologyError::DuplicateNodeId(node.id.0.clone()));
            }
        }

        for node in &nodes {
            tracing::info!("Registered node {}", node);
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
