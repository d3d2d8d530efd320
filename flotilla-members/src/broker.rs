use std::net::SocketAddr;
use std::sync::Arc;

use rkyv::{Archive, Deserialize, Serialize};

/// A unique ID for a node within the cluster.
pub type NodeId = i32;

/// A shared, immutable broker record.
pub type BrokerPtr = Arc<Broker>;

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Clone, Debug, Default, PartialEq, Eq)]
#[archive(check_bytes)]
/// The resources a broker advertises to the rest of the cluster.
pub struct BrokerProperties {
    /// The number of cores the broker runs shards on.
    pub cores: u32,
    /// The memory available to the broker in GiB.
    pub available_memory_gb: u32,
    /// The disk space available to the broker in GiB.
    pub available_disk_gb: u32,
    /// The data directories of the broker.
    pub mount_paths: Vec<String>,
}

impl BrokerProperties {
    pub fn with_cores(cores: u32) -> Self {
        Self {
            cores,
            ..Default::default()
        }
    }
}

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Clone, Debug, PartialEq, Eq)]
#[archive(check_bytes)]
/// A reachable node of the cluster.
///
/// Brokers are values, once published they are shared behind a [BrokerPtr]
/// and never mutated.
pub struct Broker {
    id: NodeId,
    rpc_address: SocketAddr,
    properties: BrokerProperties,
}

impl Broker {
    pub fn new(id: NodeId, rpc_address: SocketAddr, properties: BrokerProperties) -> Self {
        Self {
            id,
            rpc_address,
            properties,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    /// The address other nodes use to reach the broker's internal RPC server.
    pub fn rpc_address(&self) -> SocketAddr {
        self.rpc_address
    }

    #[inline]
    pub fn properties(&self) -> &BrokerProperties {
        &self.properties
    }

    #[inline]
    pub fn cores(&self) -> u32 {
        self.properties.cores
    }
}
