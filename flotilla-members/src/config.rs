use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::broker::{Broker, BrokerProperties, NodeId};

/// How long a single join RPC may take before it is abandoned.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
/// The pause between two full passes over the seed servers.
pub const DEFAULT_JOIN_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
#[error("Invalid seed server {0:?}, expected the format `<node_id>@<host:port>`.")]
pub struct InvalidSeedServer(String);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// A node contacted when joining the cluster.
pub struct SeedServer {
    pub id: NodeId,
    pub addr: SocketAddr,
}

impl SeedServer {
    pub fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self { id, addr }
    }
}

impl FromStr for SeedServer {
    type Err = InvalidSeedServer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, addr) = s
            .split_once('@')
            .ok_or_else(|| InvalidSeedServer(s.to_string()))?;

        let id = id
            .trim()
            .parse()
            .map_err(|_| InvalidSeedServer(s.to_string()))?;
        let addr = addr
            .trim()
            .parse()
            .map_err(|_| InvalidSeedServer(s.to_string()))?;

        Ok(Self { id, addr })
    }
}

impl Display for SeedServer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

#[derive(Debug, Clone)]
/// Settings of the membership subsystem of a single node.
pub struct MembershipConfig {
    /// The unique ID of the local node.
    pub node_id: NodeId,
    /// The address other nodes reach the local controller service on.
    pub rpc_address: SocketAddr,
    /// The resources advertised by the local node.
    pub properties: BrokerProperties,
    /// The nodes contacted, in order, when joining the cluster.
    pub seed_servers: Vec<SeedServer>,
    /// The per-request deadline of a join RPC.
    pub join_timeout: Duration,
    /// The delay between two join cycles.
    pub join_retry_interval: Duration,
}

impl MembershipConfig {
    /// Creates a new config with the default timings.
    ///
    /// The advertised core count defaults to the available parallelism of the
    /// machine.
    pub fn new(
        node_id: NodeId,
        rpc_address: SocketAddr,
        seed_servers: impl IntoIterator<Item = SeedServer>,
    ) -> Self {
        Self {
            node_id,
            rpc_address,
            properties: BrokerProperties::with_cores(default_cores()),
            seed_servers: seed_servers.into_iter().collect(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            join_retry_interval: DEFAULT_JOIN_RETRY_INTERVAL,
        }
    }

    pub fn with_properties(mut self, properties: BrokerProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_cores(mut self, cores: u32) -> Self {
        self.properties.cores = cores;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_join_retry_interval(mut self, interval: Duration) -> Self {
        self.join_retry_interval = interval;
        self
    }

    /// The broker record describing the local node.
    pub fn self_broker(&self) -> Broker {
        Broker::new(self.node_id, self.rpc_address, self.properties.clone())
    }
}

fn default_cores() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_server() {
        let seed: SeedServer = "3@127.0.0.1:33145".parse().expect("Parse seed");
        assert_eq!(seed.id, 3);
        assert_eq!(seed.addr, "127.0.0.1:33145".parse::<std::net::SocketAddr>().unwrap());
        assert_eq!(seed.to_string(), "3@127.0.0.1:33145");

        let seed: SeedServer = " 12 @ [::1]:9092".parse().expect("Parse seed");
        assert_eq!(seed.id, 12);
    }

    #[test]
    fn test_parse_invalid_seed_server() {
        assert!("127.0.0.1:33145".parse::<SeedServer>().is_err());
        assert!("abc@127.0.0.1:33145".parse::<SeedServer>().is_err());
        assert!("1@localhost".parse::<SeedServer>().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let addr = "127.0.0.1:9000".parse().unwrap();
        let config = MembershipConfig::new(1, addr, [SeedServer::new(2, addr)]);

        assert_eq!(config.join_timeout, Duration::from_secs(2));
        assert_eq!(config.join_retry_interval, Duration::from_secs(5));
        assert!(config.properties.cores >= 1);

        let config = config
            .with_cores(8)
            .with_join_timeout(Duration::from_millis(100))
            .with_join_retry_interval(Duration::from_secs(1));

        let broker = config.self_broker();
        assert_eq!(broker.id(), 1);
        assert_eq!(broker.rpc_address(), addr);
        assert_eq!(broker.cores(), 8);
        assert_eq!(config.join_timeout, Duration::from_millis(100));
    }
}
