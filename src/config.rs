//! Command-line and environment configuration for both server roles.

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;

use crate::topology::registry::{
    DEFAULT_CLUSTER_DOMAIN, DEFAULT_HOST_TEMPLATE, DEFAULT_NAMESPACE, DEFAULT_PORT, DEFAULT_SCHEME,
    NodeTopology, TopologyConfig, TopologyError,
};
use crate::topology::types::Node;

#[derive(Debug, Parser)]
#[command(name = "kvshard", version, about = "Sharded in-memory key-value store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve one shard's versioned store.
    Node(NodeArgs),
    /// Serve the router that partitions keys across the shards.
    Router(RouterArgs),
}

#[derive(Debug, Args)]
pub struct NodeArgs {
    #[arg(long, env = "KVSHARD_BIND", default_value = "0.0.0.0:7000")]
    pub bind: SocketAddr,
}

#[derive(Debug, Args)]
pub struct RouterArgs {
    #[arg(long, env = "KVSHARD_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Timeout for a single call to a shard, in milliseconds.
    #[arg(long, env = "KVSHARD_REQUEST_TIMEOUT_MS", default_value_t = 5000)]
    pub request_timeout_ms: u64,

    /// Explicit shard as `id=url`; repeatable. When given, the host
    /// template settings are ignored.
    #[arg(
        long = "node",
        env = "KVSHARD_NODES",
        value_delimiter = ',',
        value_parser = parse_node
    )]
    pub nodes: Vec<Node>,

    #[command(flatten)]
    pub topology: TopologyArgs,
}

impl RouterArgs {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The shard set: the explicit node list if one was given, the
    /// templated replica set otherwise.
    pub fn build_topology(&self) -> Result<NodeTopology, TopologyError> {
        if self.nodes.is_empty() {
            NodeTopology::build(&TopologyConfig::from(self.topology.clone()))
        } else {
            NodeTopology::from_nodes(self.nodes.clone())
        }
    }
}

/// Parses `id=url`, e.g. `kv-0=http://10.0.0.5:7000`.
fn parse_node(spec: &str) -> Result<Node, String> {
    let (id, address) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected `id=url`, got '{}'", spec))?;
    let (id, address) = (id.trim(), address.trim());
    if id.is_empty() {
        return Err(format!("node id is missing in '{}'", spec));
    }

    let url = reqwest::Url::parse(address)
        .map_err(|e| format!("invalid node url '{}': {}", address, e))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(format!("node url '{}' must be an http(s) address", address));
    }

    Ok(Node::new(id, address))
}

#[derive(Debug, Clone, Args)]
pub struct TopologyArgs {
    /// Name shared by all shards; node ids are `{base-name}-{index}`.
    #[arg(long, env = "KVSHARD_BASE_NAME", default_value = "kvstore")]
    pub base_name: String,

    #[arg(long, env = "KVSHARD_SERVICE_NAME", default_value = "kvstore-hl")]
    pub service_name: String,

    #[arg(long, env = "KVSHARD_REPLICAS", default_value_t = 3)]
    pub replicas: usize,

    #[arg(long, env = "KVSHARD_NODE_PORT", default_value_t = DEFAULT_PORT)]
    pub node_port: u32,

    #[arg(long, env = "KVSHARD_SCHEME", default_value = DEFAULT_SCHEME)]
    pub scheme: String,

    #[arg(long, env = "KVSHARD_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    #[arg(long, env = "KVSHARD_CLUSTER_DOMAIN", default_value = DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// Placeholders: {nodeId} {baseName} {serviceName} {namespace} {domain} {replicaIndex}
    #[arg(long, env = "KVSHARD_HOST_TEMPLATE", default_value = DEFAULT_HOST_TEMPLATE)]
    pub host_template: String,
}

impl From<TopologyArgs> for TopologyConfig {
    fn from(args: TopologyArgs) -> Self {
        Self {
            base_name: args.base_name,
            service_name: args.service_name,
            replica_count: args.replicas,
            port: args.node_port,
            scheme: args.scheme,
            namespace: args.namespace,
            cluster_domain: args.cluster_domain,
            host_template: args.host_template,
        }
    }
}
