//! # Flotilla Members
//! The cluster membership manager of a sharded node.
//!
//! The committed configuration of group 0 is the single source of truth for
//! which brokers form the cluster. The [MembersManager] applies every
//! configuration to the partition allocator, to the members table of each
//! shard and to the broker connection cache. Nodes which are not yet part of
//! the configuration join by asking the configured seed servers, retrying
//! until one of them succeeds.
//!
//! ## Basic Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use flotilla_members::test_utils::{LocalNetwork, MemGroup, test_broker, test_config};
//! use flotilla_members::{ConnectionCache, MembersManager, MembersTable, PartitionAllocator};
//! use flotilla_runtime::{AbortSource, Sharded};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let group = MemGroup::with_members([test_broker(1)], Some(1));
//!
//!     let manager = MembersManager::new(
//!         &test_config(1, &[1]),
//!         Arc::new(group.handle(1)),
//!         Sharded::start(2, |_| MembersTable::default()),
//!         ConnectionCache::new(LocalNetwork::default()),
//!         Sharded::start(2, |_| PartitionAllocator::default()),
//!         AbortSource::new(),
//!     );
//!
//!     manager.start().await?;
//!     assert!(manager.is_already_member());
//!     manager.stop().await;
//!
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate tracing;

mod allocator;
mod broker;
mod config;
mod consensus;
mod diff;
mod error;
mod manager;
mod members_table;
pub mod rpc;
mod statistics;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use allocator::{AllocationNode, PartitionAllocator, PartitionId};
pub use broker::{Broker, BrokerProperties, BrokerPtr, NodeId};
pub use config::{
    InvalidSeedServer,
    MembershipConfig,
    SeedServer,
    DEFAULT_JOIN_RETRY_INTERVAL,
    DEFAULT_JOIN_TIMEOUT,
};
pub use consensus::{
    Consensus,
    ConsensusError,
    GroupConfiguration,
    Record,
    RecordBatch,
    GROUP_CONFIGURATION_KEY,
};
pub use diff::{calculate_changed_brokers, BrokerDiff};
pub use error::{Errc, MembershipError};
pub use manager::{MembersManager, CONTROLLER_SHARD};
pub use members_table::MembersTable;
pub use rpc::{
    ConnectionCache,
    ControllerClient,
    ControllerService,
    ErrorCode,
    JoinHandler,
    JoinReply,
    JoinRequest,
    Status,
    Transport,
};
pub use statistics::MembershipStatistics;
