use std::collections::{BTreeMap, BTreeSet};

use flotilla_runtime::ShardId;

use crate::broker::NodeId;
use crate::consensus::GroupConfiguration;

pub type PartitionId = i32;

#[derive(Debug, Clone, PartialEq, Eq)]
/// The allocation state of a single node.
pub struct AllocationNode {
    id: NodeId,
    cores: u32,
    partitions: BTreeSet<PartitionId>,
}

impl AllocationNode {
    pub fn new(id: NodeId, cores: u32, partitions: BTreeSet<PartitionId>) -> Self {
        Self {
            id,
            cores,
            partitions,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn cores(&self) -> u32 {
        self.cores
    }

    #[inline]
    pub fn partitions(&self) -> &BTreeSet<PartitionId> {
        &self.partitions
    }
}

#[derive(Debug, Default)]
/// The registry of nodes partitions can be placed on.
///
/// Only the instance living on [PartitionAllocator::SHARD] is used.
/// Nodes are only ever registered, never removed.
pub struct PartitionAllocator {
    nodes: BTreeMap<NodeId, AllocationNode>,
}

impl PartitionAllocator {
    /// The shard the allocator lives on.
    pub const SHARD: ShardId = 0;

    #[inline]
    pub fn contains_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Registers a node with the allocator.
    ///
    /// Returns `false` and leaves the existing entry untouched if the node is
    /// already registered.
    pub fn register_node(&mut self, node: AllocationNode) -> bool {
        if self.contains_node(node.id()) {
            return false;
        }

        self.nodes.insert(node.id(), node);
        true
    }

    /// Registers every node of the configuration not yet known to the allocator,
    /// returning the IDs of the newly registered nodes.
    pub fn register_new_nodes(&mut self, cfg: &GroupConfiguration) -> Vec<NodeId> {
        let mut registered = Vec::new();

        for broker in cfg.nodes() {
            let node = AllocationNode::new(broker.id(), broker.cores(), BTreeSet::new());
            if self.register_node(node) {
                registered.push(broker.id());
            }
        }

        registered
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&AllocationNode> {
        self.nodes.get(&node_id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, BrokerProperties};
    use crate::test_utils::{test_addr, test_broker};

    #[test]
    fn test_register_new_nodes() {
        let mut allocator = PartitionAllocator::default();
        assert!(allocator.is_empty());

        let cfg = GroupConfiguration::new([test_broker(1), test_broker(2)], None);
        assert_eq!(allocator.register_new_nodes(&cfg), vec![1, 2]);

        let cfg = GroupConfiguration::new([test_broker(2), test_broker(3)], None);
        assert_eq!(allocator.register_new_nodes(&cfg), vec![3]);

        assert_eq!(
            allocator.node_ids(),
            vec![1, 2, 3],
            "Nodes missing from the configuration should stay registered."
        );
    }

    #[test]
    fn test_existing_nodes_are_untouched() {
        let mut allocator = PartitionAllocator::default();
        allocator.register_node(AllocationNode::new(5, 4, BTreeSet::from([1, 2])));

        let resized = Broker::new(5, test_addr(5), BrokerProperties::with_cores(32));
        let cfg = GroupConfiguration::new([resized], None);
        assert!(allocator.register_new_nodes(&cfg).is_empty());

        let node = allocator.get_node(5).expect("Node should be registered");
        assert_eq!(node.cores(), 4);
        assert_eq!(node.partitions(), &BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_new_nodes_take_broker_cores() {
        let mut allocator = PartitionAllocator::default();
        let broker = Broker::new(9, test_addr(9), BrokerProperties::with_cores(16));
        allocator.register_new_nodes(&GroupConfiguration::new([broker], None));

        let node = allocator.get_node(9).unwrap();
        assert_eq!(node.id(), 9);
        assert_eq!(node.cores(), 16);
        assert!(node.partitions().is_empty());
    }
}
