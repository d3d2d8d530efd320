use std::collections::BTreeMap;

use crate::broker::{BrokerPtr, NodeId};
use crate::consensus::GroupConfiguration;
use crate::diff::{calculate_changed_brokers, BrokerDiff};

#[derive(Debug, Clone, Default)]
/// The brokers a single shard believes are part of the cluster.
///
/// One table exists per shard, they are kept aligned by applying every group 0
/// configuration to each shard.
pub struct MembersTable {
    brokers: BTreeMap<NodeId, BrokerPtr>,
}

impl MembersTable {
    pub fn all_brokers(&self) -> Vec<BrokerPtr> {
        self.brokers.values().cloned().collect()
    }

    pub fn all_broker_ids(&self) -> Vec<NodeId> {
        self.brokers.keys().copied().collect()
    }

    pub fn get_broker(&self, node_id: NodeId) -> Option<BrokerPtr> {
        self.brokers.get(&node_id).cloned()
    }

    #[inline]
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.brokers.contains_key(&node_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }

    /// Calculates the change required to bring this table in line with the
    /// given configuration.
    pub fn calculate_diff(&self, cfg: &GroupConfiguration) -> BrokerDiff {
        calculate_changed_brokers(cfg.brokers(), self.all_brokers())
    }

    /// Applies a diff to the table, removing deleted brokers before adding new ones.
    pub fn update_brokers(&mut self, diff: BrokerDiff) {
        for removed in diff.deletions {
            self.brokers.remove(&removed.id());
        }

        for added in diff.additions {
            self.brokers.insert(added.id(), added);
        }
    }
}
