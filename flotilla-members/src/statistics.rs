use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Counter = AtomicU64;

#[derive(Debug, Clone, Default)]
/// Live metrics around the membership system.
pub struct MembershipStatistics(Arc<MembershipStatisticsInner>);

impl Deref for MembershipStatistics {
    type Target = MembershipStatisticsInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct MembershipStatisticsInner {
    /// The number of join requests dispatched to seed servers.
    pub(crate) num_join_attempts: Counter,
    /// The number of join cycles where every seed server failed.
    pub(crate) num_join_cycles_exhausted: Counter,
    /// The number of group configurations applied.
    pub(crate) num_config_updates: Counter,
    /// The number of brokers in the controller shard's members table.
    pub(crate) num_brokers: Counter,
    /// The number of open broker connections.
    pub(crate) num_connections: Counter,
}

impl MembershipStatisticsInner {
    /// The number of join requests dispatched to seed servers.
    pub fn num_join_attempts(&self) -> u64 {
        self.num_join_attempts.load(Ordering::Relaxed)
    }

    /// The number of join cycles where every seed server failed.
    pub fn num_join_cycles_exhausted(&self) -> u64 {
        self.num_join_cycles_exhausted.load(Ordering::Relaxed)
    }

    /// The number of group configurations applied.
    pub fn num_config_updates(&self) -> u64 {
        self.num_config_updates.load(Ordering::Relaxed)
    }

    /// The number of brokers in the controller shard's members table.
    pub fn num_brokers(&self) -> u64 {
        self.num_brokers.load(Ordering::Relaxed)
    }

    /// The number of open broker connections.
    pub fn num_connections(&self) -> u64 {
        self.num_connections.load(Ordering::Relaxed)
    }
}
