use std::io;

use flotilla_runtime::{GateClosed, ShardError};
use thiserror::Error;

use crate::consensus::ConsensusError;
use crate::rpc::Status;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Domain level result codes of the membership subsystem.
pub enum Errc {
    Success,
    SeedServersExhausted,
    NoLeaderController,
    JoinRequestDispatchError,
}

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Every seed server was tried without successfully joining the cluster.")]
    SeedServersExhausted,

    #[error("No leader is currently known for group 0.")]
    NoLeaderController,

    #[error("Failed to dispatch the join request to the group 0 leader: {0}")]
    JoinRequestDispatch(Status),

    #[error("{0}")]
    /// The remote node failed to handle the request.
    Rpc(#[from] Status),

    #[error("{0}")]
    Consensus(#[from] ConsensusError),

    #[error("{0}")]
    Shard(#[from] ShardError),

    #[error("{0}")]
    /// An IO error has occurred.
    IO(#[from] io::Error),

    #[error("Invalid group configuration record: {0}")]
    InvalidRecord(String),

    #[error("The members manager is shutting down.")]
    ShuttingDown(#[from] GateClosed),
}

impl MembershipError {
    /// The domain level code of the error, if it has one.
    pub fn errc(&self) -> Option<Errc> {
        match self {
            Self::SeedServersExhausted => Some(Errc::SeedServersExhausted),
            Self::NoLeaderController => Some(Errc::NoLeaderController),
            Self::JoinRequestDispatch(_) => Some(Errc::JoinRequestDispatchError),
            _ => None,
        }
    }
}
