use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flotilla_runtime::{AbortSource, Gate, ShardId, Sharded};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::allocator::PartitionAllocator;
use crate::broker::{Broker, NodeId};
use crate::config::{MembershipConfig, SeedServer};
use crate::consensus::{Consensus, GroupConfiguration, RecordBatch};
use crate::diff::BrokerDiff;
use crate::error::{Errc, MembershipError};
use crate::members_table::MembersTable;
use crate::rpc::{ConnectionCache, ControllerClient, JoinReply, JoinRequest, Status, Transport};
use crate::statistics::MembershipStatistics;

/// The shard the manager treats as its home when diffing configurations.
pub const CONTROLLER_SHARD: ShardId = 0;

/// Drives the membership of the local node.
///
/// The manager joins the node to the cluster via the configured seed servers
/// and keeps the members table, the partition allocator and the connection
/// cache in line with every committed configuration of group 0.
///
/// Handles are cheap to clone and share the same state.
pub struct MembersManager<C, T>
where
    C: Consensus,
    T: Transport,
{
    inner: Arc<ManagerInner<C, T>>,
}

impl<C, T> Clone for MembersManager<C, T>
where
    C: Consensus,
    T: Transport,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct ManagerInner<C, T>
where
    C: Consensus,
    T: Transport,
{
    seed_servers: Vec<SeedServer>,
    self_broker: Broker,
    join_timeout: Duration,
    join_retry_interval: Duration,
    raft0: Arc<C>,
    members_table: Sharded<MembersTable>,
    connections: ConnectionCache<T>,
    allocator: Sharded<PartitionAllocator>,
    abort_source: AbortSource,
    gate: Gate,
    started: AtomicBool,
    statistics: MembershipStatistics,
    changes_tx: watch::Sender<BrokerDiff>,
    changes_rx: watch::Receiver<BrokerDiff>,
}

impl<C, T> MembersManager<C, T>
where
    C: Consensus,
    T: Transport,
{
    pub fn new(
        config: &MembershipConfig,
        raft0: Arc<C>,
        members_table: Sharded<MembersTable>,
        connections: ConnectionCache<T>,
        allocator: Sharded<PartitionAllocator>,
        abort_source: AbortSource,
    ) -> Self {
        let (changes_tx, changes_rx) = watch::channel(BrokerDiff::default());

        let inner = ManagerInner {
            seed_servers: config.seed_servers.clone(),
            self_broker: config.self_broker(),
            join_timeout: config.join_timeout,
            join_retry_interval: config.join_retry_interval,
            raft0,
            members_table,
            connections,
            allocator,
            abort_source,
            gate: Gate::new(),
            started: AtomicBool::new(false),
            statistics: MembershipStatistics::default(),
            changes_tx,
            changes_rx,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.inner.self_broker.id()
    }

    #[inline]
    /// The broker record advertised by the local node.
    pub fn self_broker(&self) -> &Broker {
        &self.inner.self_broker
    }

    #[inline]
    pub fn seed_servers(&self) -> &[SeedServer] {
        &self.inner.seed_servers
    }

    #[inline]
    /// Gets the live membership statistics.
    pub fn statistics(&self) -> MembershipStatistics {
        self.inner.statistics.clone()
    }

    #[inline]
    /// Get a stream of the broker diffs produced by applied configurations.
    ///
    /// The stream starts with the most recently applied diff.
    pub fn membership_changes(&self) -> WatchStream<BrokerDiff> {
        WatchStream::new(self.inner.changes_rx.clone())
    }

    #[inline]
    pub fn connections(&self) -> &ConnectionCache<T> {
        &self.inner.connections
    }

    #[inline]
    pub fn members_table(&self) -> &Sharded<MembersTable> {
        &self.inner.members_table
    }

    #[inline]
    pub fn allocator(&self) -> &Sharded<PartitionAllocator> {
        &self.inner.allocator
    }

    #[inline]
    pub fn abort_source(&self) -> &AbortSource {
        &self.inner.abort_source
    }

    /// Returns if the local node is part of the committed group 0 configuration.
    pub fn is_already_member(&self) -> bool {
        self.inner.raft0.config().contains(self.node_id())
    }

    /// Starts the manager.
    ///
    /// If the node is not yet a member of the cluster the join loop is started
    /// in the background. The current group configuration is then applied,
    /// which installs the initial members, allocation nodes and connections.
    ///
    /// Only the first call has any effect. A stopped manager cannot be started.
    pub async fn start(&self) -> Result<(), MembershipError> {
        let _guard = self.inner.gate.enter()?;

        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!(node_id = self.node_id(), "Members manager has already been started.");
            return Ok(());
        }

        info!(
            node_id = self.node_id(),
            rpc_address = %self.inner.self_broker.rpc_address(),
            num_seed_servers = self.inner.seed_servers.len(),
            "Starting members manager.",
        );

        if !self.is_already_member() {
            let manager = self.clone();
            self.inner.gate.spawn(manager.run_join_loop())?;
        }

        let cfg = self.inner.raft0.config();
        self.apply_snapshot(cfg).await
    }

    /// Stops the manager, waiting for the join loop and any in-flight join
    /// requests to complete.
    pub async fn stop(&self) {
        info!(node_id = self.node_id(), "Stopping members manager.");
        self.inner.gate.close().await;
    }

    /// Applies a committed group configuration record.
    pub async fn apply_update(&self, batch: &RecordBatch) -> Result<Errc, MembershipError> {
        let cfg = GroupConfiguration::decode(batch)?;
        debug!(
            node_id = self.node_id(),
            offset = batch.base_offset(),
            "Decoded group configuration record.",
        );

        self.apply_snapshot(cfg).await?;
        Ok(Errc::Success)
    }

    /// Brings the allocator, the members table of every shard and the
    /// connection cache in line with the given configuration.
    ///
    /// Callers must not apply configurations concurrently.
    pub async fn apply_snapshot(&self, cfg: GroupConfiguration) -> Result<(), MembershipError> {
        let cfg = Arc::new(cfg);
        let members = cfg.nodes().iter().map(Broker::id).collect::<Vec<_>>();
        info!(
            node_id = self.node_id(),
            members = ?members,
            leader_id = ?cfg.leader_id(),
            "Applying group configuration.",
        );

        let registered = {
            let cfg = cfg.clone();
            self.inner
                .allocator
                .invoke_on(PartitionAllocator::SHARD, move |allocator| {
                    allocator.register_new_nodes(&cfg)
                })
                .await?
        };

        if !registered.is_empty() {
            debug!(nodes = ?registered, "Registered new allocation nodes.");
        }

        let diff = {
            let cfg = cfg.clone();
            self.inner
                .members_table
                .invoke_on(CONTROLLER_SHARD, move |table| table.calculate_diff(&cfg))
                .await?
        };

        // Each shard diffs against its own state so diverged shards converge.
        let fan_out = {
            let cfg = cfg.clone();
            self.inner
                .members_table
                .invoke_on_all(move |table| {
                    let diff = table.calculate_diff(&cfg);
                    table.update_brokers(diff);
                    table.len()
                })
                .await
        };

        if let Err(e) = &fan_out {
            warn!(
                node_id = self.node_id(),
                error = ?e,
                "Failed to update the members table on every shard.",
            );
        }

        self.inner
            .connections
            .reconcile(self.node_id(), &diff)
            .await?;

        debug!(
            node_id = self.node_id(),
            added = ?diff.added_ids(),
            removed = ?diff.deleted_ids(),
            "Reconciled broker connections.",
        );

        let statistics = &self.inner.statistics;
        statistics.num_config_updates.fetch_add(1, Ordering::Relaxed);
        statistics
            .num_connections
            .store(self.inner.connections.len() as u64, Ordering::Relaxed);

        self.inner.changes_tx.send_replace(diff);

        let num_brokers = fan_out?
            .get(CONTROLLER_SHARD)
            .copied()
            .unwrap_or_default();
        statistics
            .num_brokers
            .store(num_brokers as u64, Ordering::Relaxed);

        Ok(())
    }

    /// Handles a request for the given broker to join the cluster.
    ///
    /// The group 0 leader adds the broker to the group directly, any other node
    /// forwards the request to the leader once.
    pub async fn handle_join_request(&self, broker: Broker) -> Result<JoinReply, MembershipError> {
        let _guard = self.inner.gate.enter()?;

        if self.inner.raft0.is_leader() {
            info!(
                node_id = broker.id(),
                addr = %broker.rpc_address(),
                "Adding node to group 0.",
            );

            self.inner.raft0.add_group_member(broker).await?;
            return Ok(JoinReply { success: true });
        }

        self.dispatch_join_to_leader(broker).await
    }

    async fn dispatch_join_to_leader(&self, broker: Broker) -> Result<JoinReply, MembershipError> {
        let cfg = self.inner.raft0.config();
        let leader = self
            .inner
            .raft0
            .leader_id()
            .and_then(|leader_id| cfg.find(leader_id))
            .ok_or(MembershipError::NoLeaderController)?;

        let node_id = broker.id();
        let leader_id = leader.id();
        debug!(node_id = node_id, leader_id = leader_id, "Forwarding join request to leader.");

        self.send_join(leader_id, leader.rpc_address(), JoinRequest::new(broker))
            .await
            .map_err(|status| {
                warn!(
                    node_id = node_id,
                    leader_id = leader_id,
                    error = %status,
                    "Failed to dispatch join request to the group 0 leader.",
                );
                MembershipError::JoinRequestDispatch(status)
            })
    }

    async fn run_join_loop(self) {
        loop {
            match self.dispatch_join_to_seed_servers().await {
                Ok(()) => {
                    info!(node_id = self.node_id(), "Successfully joined the cluster.");
                    return;
                },
                Err(e) => {
                    info!(node_id = self.node_id(), error = %e, "Join attempt failed.");
                },
            }

            if self.should_stop_joining() {
                break;
            }

            self.wait_for_next_join_retry().await;

            if self.should_stop_joining() {
                break;
            }
        }

        debug!(node_id = self.node_id(), "Join loop has stopped.");
    }

    fn should_stop_joining(&self) -> bool {
        self.inner.gate.is_closed()
            || self.inner.abort_source.abort_requested()
            || self.is_already_member()
    }

    /// Tries each seed server in order until one accepts the join request.
    async fn dispatch_join_to_seed_servers(&self) -> Result<(), MembershipError> {
        for seed in self.inner.seed_servers.iter() {
            self.inner
                .statistics
                .num_join_attempts
                .fetch_add(1, Ordering::Relaxed);

            let result = if seed.id == self.node_id() {
                debug!(node_id = self.node_id(), "Using the local node as seed server.");
                self.handle_join_request(self.inner.self_broker.clone())
                    .await
            } else {
                self.dispatch_join_to_remote(seed).await
            };

            match result {
                Ok(reply) if reply.success => return Ok(()),
                Ok(_) => {
                    info!(seed = %seed, "Seed server rejected the join request.");
                },
                Err(e) => {
                    info!(seed = %seed, error = %e, "Failed to join via seed server.");
                },
            }
        }

        self.inner
            .statistics
            .num_join_cycles_exhausted
            .fetch_add(1, Ordering::Relaxed);
        Err(MembershipError::SeedServersExhausted)
    }

    async fn dispatch_join_to_remote(&self, seed: &SeedServer) -> Result<JoinReply, MembershipError> {
        info!(node_id = self.node_id(), seed = %seed, "Sending join request.");

        let request = JoinRequest::new(self.inner.self_broker.clone());
        let reply = self.send_join(seed.id, seed.addr, request).await?;
        Ok(reply)
    }

    async fn send_join(
        &self,
        node_id: NodeId,
        addr: std::net::SocketAddr,
        request: JoinRequest,
    ) -> Result<JoinReply, Status> {
        let timeout = self.inner.join_timeout;

        self.inner
            .connections
            .with_client(node_id, addr, |client| async move {
                match tokio::time::timeout(timeout, client.join(request)).await {
                    Ok(reply) => reply,
                    Err(_) => Err(Status::timeout()),
                }
            })
            .await
            .map_err(Status::connection)?
    }

    async fn wait_for_next_join_retry(&self) {
        let interval = self.inner.join_retry_interval;
        info!(
            node_id = self.node_id(),
            retry_in = ?interval,
            "Every seed server failed, retrying join later.",
        );

        tokio::select! {
            result = self.inner.abort_source.sleep_abortable(interval) => {
                if result.is_err() {
                    debug!(node_id = self.node_id(), "Join retry has been aborted.");
                }
            },
            _ = self.inner.gate.closed() => {
                debug!(node_id = self.node_id(), "Join retry interrupted by shutdown.");
            },
        }
    }
}
