use std::collections::BTreeMap;

use crate::broker::{BrokerPtr, NodeId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// The change between two broker sets, keyed by node ID.
///
/// A node never appears in both `additions` and `deletions`.
pub struct BrokerDiff {
    /// Brokers present in the new set but not in the old one.
    pub additions: Vec<BrokerPtr>,
    /// Brokers present in the old set but not in the new one.
    pub deletions: Vec<BrokerPtr>,
}

impl BrokerDiff {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }

    pub fn added_ids(&self) -> Vec<NodeId> {
        self.additions.iter().map(|broker| broker.id()).collect()
    }

    pub fn deleted_ids(&self) -> Vec<NodeId> {
        self.deletions.iter().map(|broker| broker.id()).collect()
    }
}

/// Calculates the brokers added and removed going from `old_set` to `new_set`.
///
/// Brokers are compared by node ID only. A broker whose ID is in both sets is
/// considered unchanged even if its address or properties differ.
/// Both sides of the diff are ordered by node ID.
pub fn calculate_changed_brokers(
    new_set: impl IntoIterator<Item = BrokerPtr>,
    old_set: impl IntoIterator<Item = BrokerPtr>,
) -> BrokerDiff {
    let new_set = key_by_id(new_set);
    let old_set = key_by_id(old_set);

    let additions = new_set
        .iter()
        .filter(|(node_id, _)| !old_set.contains_key(node_id))
        .map(|(_, broker)| broker.clone())
        .collect();

    let deletions = old_set
        .iter()
        .filter(|(node_id, _)| !new_set.contains_key(node_id))
        .map(|(_, broker)| broker.clone())
        .collect();

    BrokerDiff {
        additions,
        deletions,
    }
}

fn key_by_id(brokers: impl IntoIterator<Item = BrokerPtr>) -> BTreeMap<NodeId, BrokerPtr> {
    brokers
        .into_iter()
        .map(|broker| (broker.id(), broker))
        .collect()
}
