mod controller;
mod network;
mod status;

pub use controller::{ControllerClient, ControllerService, JoinHandler, JoinReply, JoinRequest};
pub use network::{ConnectionCache, Transport};
pub use status::{ArchivedErrorCode, ArchivedStatus, ErrorCode, Status};
