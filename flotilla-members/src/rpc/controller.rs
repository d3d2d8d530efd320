use async_trait::async_trait;
use rkyv::{Archive, Deserialize, Serialize};

use crate::broker::Broker;
use crate::consensus::Consensus;
use crate::error::MembershipError;
use crate::manager::MembersManager;
use crate::rpc::network::Transport;
use crate::rpc::status::{ErrorCode, Status};

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Clone, Debug, PartialEq, Eq)]
#[archive(check_bytes)]
/// A request for the given node to be added to group 0.
pub struct JoinRequest {
    pub node: Broker,
}

impl JoinRequest {
    pub fn new(node: Broker) -> Self {
        Self { node }
    }
}

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Copy, Clone, Debug, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct JoinReply {
    pub success: bool,
}

#[async_trait]
/// The client side of the controller service of a remote node.
pub trait ControllerClient: Send + Sync + 'static {
    /// Asks the remote node to add the broker to group 0.
    async fn join(&self, request: JoinRequest) -> Result<JoinReply, Status>;

    /// Closes the underlying connection.
    ///
    /// Called once the client is evicted from the connection cache.
    fn close(&self) {}
}

#[async_trait]
/// The server side of the controller `join` RPC.
pub trait JoinHandler: Send + Sync + 'static {
    async fn on_join(&self, request: JoinRequest) -> Result<JoinReply, Status>;
}

/// The controller service every node exposes to its peers.
pub struct ControllerService<C, T>
where
    C: Consensus,
    T: Transport,
{
    manager: MembersManager<C, T>,
}

impl<C, T> ControllerService<C, T>
where
    C: Consensus,
    T: Transport,
{
    pub fn new(manager: MembersManager<C, T>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl<C, T> JoinHandler for ControllerService<C, T>
where
    C: Consensus,
    T: Transport,
{
    async fn on_join(&self, request: JoinRequest) -> Result<JoinReply, Status> {
        self.manager
            .handle_join_request(request.node)
            .await
            .map_err(Status::from)
    }
}

impl From<MembershipError> for Status {
    fn from(error: MembershipError) -> Self {
        match error {
            MembershipError::Rpc(status) => status,
            MembershipError::NoLeaderController => {
                Status::new(ErrorCode::NoLeaderController, error)
            },
            MembershipError::JoinRequestDispatch(_) => {
                Status::new(ErrorCode::JoinRequestDispatchError, error)
            },
            MembershipError::SeedServersExhausted => {
                Status::new(ErrorCode::SeedServersExhausted, error)
            },
            MembershipError::ShuttingDown(_) => Status::unavailable(error),
            other => Status::internal(other),
        }
    }
}
