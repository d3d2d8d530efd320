use std::sync::Arc;

use async_trait::async_trait;
use rkyv::{AlignedVec, Archive, Deserialize, Serialize};

use crate::broker::{Broker, BrokerPtr, NodeId};
use crate::error::MembershipError;

/// The key every group configuration record is written under.
pub static GROUP_CONFIGURATION_KEY: &[u8] = b"group_configuration";

const SCRATCH_SPACE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Node {node_id} is not the leader of group 0.")]
    NotLeader { node_id: NodeId },

    #[error("Failed to replicate the configuration change: {0}")]
    Replication(anyhow::Error),
}

#[async_trait]
/// A handle to group 0, the consensus group carrying the cluster configuration.
pub trait Consensus: Send + Sync + 'static {
    /// The latest committed configuration of the group.
    fn config(&self) -> GroupConfiguration;

    /// The current leader of the group, if one is known.
    fn leader_id(&self) -> Option<NodeId>;

    /// Returns if the local node is the leader of the group.
    fn is_leader(&self) -> bool;

    /// Adds the broker to the group's configuration.
    ///
    /// Resolves once the configuration change has been committed.
    async fn add_group_member(&self, broker: Broker) -> Result<(), ConsensusError>;
}

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Clone, Debug, Default, PartialEq, Eq)]
#[archive(check_bytes)]
/// A committed configuration of group 0.
pub struct GroupConfiguration {
    nodes: Vec<Broker>,
    leader_id: Option<NodeId>,
}

impl GroupConfiguration {
    pub fn new(nodes: impl IntoIterator<Item = Broker>, leader_id: Option<NodeId>) -> Self {
        let mut cfg = Self {
            nodes: Vec::new(),
            leader_id,
        };

        for broker in nodes {
            cfg.add_node(broker);
        }

        cfg
    }

    #[inline]
    pub fn nodes(&self) -> &[Broker] {
        &self.nodes
    }

    #[inline]
    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn set_leader_id(&mut self, leader_id: Option<NodeId>) {
        self.leader_id = leader_id;
    }

    /// Returns if the node is a voting member of the group.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.find(node_id).is_some()
    }

    pub fn find(&self, node_id: NodeId) -> Option<&Broker> {
        self.nodes.iter().find(|broker| broker.id() == node_id)
    }

    /// Produces shared copies of every broker in the configuration.
    pub fn brokers(&self) -> Vec<BrokerPtr> {
        self.nodes.iter().cloned().map(Arc::new).collect()
    }

    /// Adds a node to the configuration.
    ///
    /// Returns `false` if a node with the same ID is already present.
    pub fn add_node(&mut self, broker: Broker) -> bool {
        if self.contains(broker.id()) {
            return false;
        }

        self.nodes.push(broker);
        true
    }

    /// Removes a node from the configuration, returning it if present.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Broker> {
        let position = self.nodes.iter().position(|broker| broker.id() == node_id)?;
        Some(self.nodes.remove(position))
    }

    /// Encodes the configuration into a single record batch.
    pub fn to_record_batch(&self, base_offset: u64) -> Result<RecordBatch, MembershipError> {
        let value = rkyv::to_bytes::<_, SCRATCH_SPACE>(self).map_err(|_| {
            MembershipError::InvalidRecord(
                "Failed to serialize group configuration.".to_string(),
            )
        })?;

        let record = Record {
            key: GROUP_CONFIGURATION_KEY.to_vec(),
            value: value.to_vec(),
        };

        Ok(RecordBatch::new(base_offset, vec![record]))
    }

    /// Decodes the configuration held by the first record of the batch.
    pub fn decode(batch: &RecordBatch) -> Result<Self, MembershipError> {
        if !batch.verify_crc() {
            return Err(MembershipError::InvalidRecord(format!(
                "Checksum mismatch for batch at offset {}.",
                batch.base_offset(),
            )));
        }

        let record = batch.records().first().ok_or_else(|| {
            MembershipError::InvalidRecord(format!(
                "Batch at offset {} contains no records.",
                batch.base_offset(),
            ))
        })?;

        let mut aligned = AlignedVec::with_capacity(record.value.len());
        aligned.extend_from_slice(&record.value);

        rkyv::from_bytes::<Self>(&aligned).map_err(|_| {
            MembershipError::InvalidRecord(format!(
                "Record at offset {} is not a valid group configuration.",
                batch.base_offset(),
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A single entry of a committed record batch.
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A batch of records committed to the group 0 log.
pub struct RecordBatch {
    base_offset: u64,
    crc: u32,
    records: Vec<Record>,
}

impl RecordBatch {
    /// Creates a new batch, calculating the checksum of the records.
    pub fn new(base_offset: u64, records: Vec<Record>) -> Self {
        let crc = Self::compute_crc(&records);
        Self {
            base_offset,
            crc,
            records,
        }
    }

    /// Rebuilds a batch from its raw parts, as read back from the log.
    pub fn from_parts(base_offset: u64, crc: u32, records: Vec<Record>) -> Self {
        Self {
            base_offset,
            crc,
            records,
        }
    }

    #[inline]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    #[inline]
    pub fn crc(&self) -> u32 {
        self.crc
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns if the stored checksum matches the records.
    pub fn verify_crc(&self) -> bool {
        Self::compute_crc(&self.records) == self.crc
    }

    fn compute_crc(records: &[Record]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();

        for record in records {
            hasher.update(&(record.key.len() as u32).to_le_bytes());
            hasher.update(&record.key);
            hasher.update(&(record.value.len() as u32).to_le_bytes());
            hasher.update(&record.value);
        }

        hasher.finalize()
    }
}
