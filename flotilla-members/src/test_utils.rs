//! In-memory stand-ins for group 0 and the RPC transport.
//!
//! These are used by the unit tests of this crate and, behind the
//! `test-utils` feature, by the integration scenarios.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use flotilla_runtime::{AbortSource, Sharded};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::allocator::PartitionAllocator;
use crate::broker::{Broker, BrokerProperties, NodeId};
use crate::config::{MembershipConfig, SeedServer};
use crate::consensus::{Consensus, ConsensusError, GroupConfiguration, RecordBatch};
use crate::manager::MembersManager;
use crate::members_table::MembersTable;
use crate::rpc::{
    ConnectionCache,
    ControllerClient,
    ControllerService,
    JoinHandler,
    JoinReply,
    JoinRequest,
    Status,
    Transport,
};

/// The number of shards test managers are started with.
pub const TEST_SHARDS: usize = 3;

/// A deterministic address for the given node.
pub fn test_addr(node_id: NodeId) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 20_000 + node_id as u16))
}

pub fn test_broker(node_id: NodeId) -> Broker {
    Broker::new(node_id, test_addr(node_id), BrokerProperties::with_cores(2))
}

/// A config for the given node using [test_addr] for itself and every seed.
pub fn test_config(node_id: NodeId, seeds: &[NodeId]) -> MembershipConfig {
    let seeds = seeds
        .iter()
        .map(|seed_id| SeedServer::new(*seed_id, test_addr(*seed_id)));

    MembershipConfig::new(node_id, test_addr(node_id), seeds).with_cores(2)
}

/// Creates a manager for the node described by `config` with fresh sharded
/// services, connected to the given group and network.
pub fn create_test_manager(
    config: &MembershipConfig,
    group: &MemGroup,
    network: &LocalNetwork,
) -> MembersManager<MemGroupHandle, LocalNetwork> {
    let members_table = Sharded::start(TEST_SHARDS, |_| MembersTable::default());
    let allocator = Sharded::start(TEST_SHARDS, |_| PartitionAllocator::default());

    MembersManager::new(
        config,
        Arc::new(group.handle(config.node_id)),
        members_table,
        ConnectionCache::new(network.clone()),
        allocator,
        AbortSource::new(),
    )
}

/// Creates a manager like [create_test_manager] and serves its controller
/// service on the network at the node's address.
pub fn create_serving_test_manager(
    config: &MembershipConfig,
    group: &MemGroup,
    network: &LocalNetwork,
) -> MembersManager<MemGroupHandle, LocalNetwork> {
    let manager = create_test_manager(config, group, network);
    network.register(config.rpc_address, ControllerService::new(manager.clone()));
    manager
}

#[derive(Clone)]
/// An in-memory group 0 shared by several nodes.
///
/// Every committed configuration is emitted as a [RecordBatch] which can be
/// fed to the managers via `apply_update`.
pub struct MemGroup {
    inner: Arc<MemGroupInner>,
}

struct MemGroupInner {
    state: Mutex<MemGroupState>,
    commits_tx: flume::Sender<RecordBatch>,
    commits_rx: flume::Receiver<RecordBatch>,
}

#[derive(Default)]
struct MemGroupState {
    config: GroupConfiguration,
    added: Vec<NodeId>,
    next_offset: u64,
    fail_additions: bool,
}

impl Default for MemGroup {
    fn default() -> Self {
        let (commits_tx, commits_rx) = flume::unbounded();

        Self {
            inner: Arc::new(MemGroupInner {
                state: Mutex::default(),
                commits_tx,
                commits_rx,
            }),
        }
    }
}

impl MemGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(
        members: impl IntoIterator<Item = Broker>,
        leader_id: Option<NodeId>,
    ) -> Self {
        let group = Self::default();
        group.inner.state.lock().config = GroupConfiguration::new(members, leader_id);
        group
    }

    /// A handle to the group from the perspective of the given node.
    pub fn handle(&self, node_id: NodeId) -> MemGroupHandle {
        MemGroupHandle {
            node_id,
            group: self.clone(),
        }
    }

    pub fn config(&self) -> GroupConfiguration {
        self.inner.state.lock().config.clone()
    }

    pub fn set_leader(&self, leader_id: Option<NodeId>) {
        self.inner.state.lock().config.set_leader_id(leader_id);
    }

    /// Makes every following `add_group_member` call fail.
    pub fn fail_additions(&self, fail: bool) {
        self.inner.state.lock().fail_additions = fail;
    }

    /// The nodes added via `add_group_member`, in the order they were added.
    pub fn added_members(&self) -> Vec<NodeId> {
        self.inner.state.lock().added.clone()
    }

    /// The committed configurations which have not been taken yet.
    pub fn committed(&self) -> Vec<RecordBatch> {
        self.inner.commits_rx.drain().collect()
    }

    pub fn commits(&self) -> flume::Receiver<RecordBatch> {
        self.inner.commits_rx.clone()
    }

    /// Replaces the members of the group, keeping the leader, and returns the
    /// committed record.
    pub fn commit(&self, members: impl IntoIterator<Item = Broker>) -> RecordBatch {
        let mut state = self.inner.state.lock();
        state.config = GroupConfiguration::new(members, state.config.leader_id());
        Self::emit(&mut state)
    }

    fn emit(state: &mut MemGroupState) -> RecordBatch {
        let offset = state.next_offset;
        state.next_offset += 1;

        // Test configurations always fit the scratch space.
        state
            .config
            .to_record_batch(offset)
            .expect("Encode group configuration")
    }
}

#[derive(Clone)]
/// A node's view of a [MemGroup].
pub struct MemGroupHandle {
    node_id: NodeId,
    group: MemGroup,
}

#[async_trait]
impl Consensus for MemGroupHandle {
    fn config(&self) -> GroupConfiguration {
        self.group.config()
    }

    fn leader_id(&self) -> Option<NodeId> {
        self.group.inner.state.lock().config.leader_id()
    }

    fn is_leader(&self) -> bool {
        self.leader_id() == Some(self.node_id)
    }

    async fn add_group_member(&self, broker: Broker) -> Result<(), ConsensusError> {
        if !self.is_leader() {
            return Err(ConsensusError::NotLeader {
                node_id: self.node_id,
            });
        }

        let batch = {
            let mut state = self.group.inner.state.lock();
            if state.fail_additions {
                return Err(ConsensusError::Replication(anyhow::anyhow!(
                    "Replication has been disabled."
                )));
            }

            let node_id = broker.id();
            if !state.config.add_node(broker) {
                return Ok(());
            }

            state.added.push(node_id);
            MemGroup::emit(&mut state)
        };

        let _ = self.group.inner.commits_tx.send(batch);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected(SocketAddr),
    Closed(SocketAddr),
    Join(SocketAddr),
}

#[derive(Clone, Default)]
/// An in-process transport routing join requests to registered handlers.
///
/// Requests and replies go through an rkyv round trip like they would on the
/// wire. Every connection and request is recorded.
pub struct LocalNetwork {
    inner: Arc<LocalNetworkInner>,
}

#[derive(Default)]
struct LocalNetworkInner {
    handlers: RwLock<BTreeMap<SocketAddr, Arc<dyn JoinHandler>>>,
    black_holed: RwLock<BTreeSet<SocketAddr>>,
    refused: RwLock<BTreeSet<SocketAddr>>,
    events: Mutex<Vec<(Instant, NetworkEvent)>>,
}

impl LocalNetwork {
    /// Serves the handler at the given address.
    pub fn register(&self, addr: SocketAddr, handler: impl JoinHandler) {
        self.inner.handlers.write().insert(addr, Arc::new(handler));
    }

    pub fn deregister(&self, addr: SocketAddr) {
        self.inner.handlers.write().remove(&addr);
    }

    /// Join requests sent to the address never complete.
    pub fn black_hole(&self, addr: SocketAddr) {
        self.inner.black_holed.write().insert(addr);
    }

    /// Connecting to the address fails.
    pub fn refuse_connections(&self, addr: SocketAddr) {
        self.inner.refused.write().insert(addr);
    }

    pub fn events(&self) -> Vec<NetworkEvent> {
        self.inner
            .events
            .lock()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// The connect and close events, in the order they happened.
    pub fn connection_events(&self) -> Vec<NetworkEvent> {
        self.events()
            .into_iter()
            .filter(|event| !matches!(event, NetworkEvent::Join(_)))
            .collect()
    }

    /// The addresses join requests were sent to, in the order they were sent.
    pub fn join_targets(&self) -> Vec<SocketAddr> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                NetworkEvent::Join(addr) => Some(addr),
                _ => None,
            })
            .collect()
    }

    /// The times join requests were sent at.
    pub fn join_dispatch_times(&self) -> Vec<Instant> {
        self.inner
            .events
            .lock()
            .iter()
            .filter(|(_, event)| matches!(event, NetworkEvent::Join(_)))
            .map(|(at, _)| *at)
            .collect()
    }

    fn record(&self, event: NetworkEvent) {
        self.inner.events.lock().push((Instant::now(), event));
    }
}

impl Transport for LocalNetwork {
    type Client = LocalClient;

    fn connect(&self, addr: SocketAddr) -> io::Result<Self::Client> {
        if self.inner.refused.read().contains(&addr) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("Connection to {addr} refused."),
            ));
        }

        self.record(NetworkEvent::Connected(addr));
        Ok(LocalClient {
            addr,
            network: self.clone(),
        })
    }
}

#[derive(Clone)]
pub struct LocalClient {
    addr: SocketAddr,
    network: LocalNetwork,
}

impl LocalClient {
    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl ControllerClient for LocalClient {
    async fn join(&self, request: JoinRequest) -> Result<JoinReply, Status> {
        self.network.record(NetworkEvent::Join(self.addr));

        let black_holed = self.network.inner.black_holed.read().contains(&self.addr);
        if black_holed {
            futures::future::pending::<()>().await;
        }

        let handler = self
            .network
            .inner
            .handlers
            .read()
            .get(&self.addr)
            .cloned()
            .ok_or_else(|| Status::connection(format!("Nothing is listening on {}.", self.addr)))?;

        let request = roundtrip_request(&request)?;
        let reply = handler.on_join(request).await?;
        roundtrip_reply(&reply)
    }

    fn close(&self) {
        self.network.record(NetworkEvent::Closed(self.addr));
    }
}

fn roundtrip_request(request: &JoinRequest) -> Result<JoinRequest, Status> {
    let bytes = rkyv::to_bytes::<_, 1024>(request).map_err(|_| Status::invalid())?;
    rkyv::from_bytes::<JoinRequest>(&bytes).map_err(|_| Status::invalid())
}

fn roundtrip_reply(reply: &JoinReply) -> Result<JoinReply, Status> {
    let bytes = rkyv::to_bytes::<_, 64>(reply).map_err(|_| Status::invalid())?;
    rkyv::from_bytes::<JoinReply>(&bytes).map_err(|_| Status::invalid())
}

#[derive(Clone)]
/// A join handler which always answers with the same reply.
pub struct StaticJoinHandler {
    reply: Result<JoinReply, Status>,
    requests: Arc<Mutex<Vec<JoinRequest>>>,
}

impl StaticJoinHandler {
    pub fn accepting() -> Self {
        Self::new(Ok(JoinReply { success: true }))
    }

    pub fn rejecting() -> Self {
        Self::new(Ok(JoinReply { success: false }))
    }

    pub fn failing(status: Status) -> Self {
        Self::new(Err(status))
    }

    fn new(reply: Result<JoinReply, Status>) -> Self {
        Self {
            reply,
            requests: Arc::default(),
        }
    }

    /// The requests received so far.
    pub fn requests(&self) -> Vec<JoinRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl JoinHandler for StaticJoinHandler {
    async fn on_join(&self, request: JoinRequest) -> Result<JoinReply, Status> {
        self.requests.lock().push(request);
        self.reply.clone()
    }
}
