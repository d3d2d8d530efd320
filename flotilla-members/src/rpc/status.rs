use std::error::Error;
use std::fmt::{Display, Formatter};

use rkyv::{Archive, Deserialize, Serialize};

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Clone, Debug, PartialEq, Eq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(PartialEq, Eq, Debug))]
/// Status information around the cause of a request failing.
///
/// This includes a generic status code and message.
pub struct Status {
    /// The error code of the request.
    pub code: ErrorCode,
    /// The display message for the error.
    pub message: String,
}

impl Status {
    /// The remote node is running but cannot handle messages at this time.
    pub fn unavailable(msg: impl Display) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, msg)
    }

    /// An internal error occurred while processing the message.
    pub fn internal(msg: impl Display) -> Self {
        Self::new(ErrorCode::InternalError, msg)
    }

    /// The provided message data is invalid or unable to be deserialized.
    pub fn invalid() -> Self {
        Self::new(
            ErrorCode::InvalidPayload,
            "Invalid message payload was provided to be deserialized.",
        )
    }

    /// The connection is closed, refused or interrupted during the operation.
    pub fn connection(msg: impl Display) -> Self {
        Self::new(ErrorCode::ConnectionError, msg)
    }

    /// The operation took too long to be completed and was aborted.
    pub fn timeout() -> Self {
        Self::new(
            ErrorCode::Timeout,
            "The operation took to long to be completed.",
        )
    }

    pub fn new(code: ErrorCode, msg: impl Display) -> Self {
        Self {
            code,
            message: msg.to_string(),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for Status {}

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Copy, Clone, PartialEq, Eq, Debug)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug, PartialEq, Eq))]
/// A generic error code describing the high level reason why the request failed.
pub enum ErrorCode {
    /// The remote node cannot handle messages at this time.
    ServiceUnavailable,
    /// An internal error occurred while processing the message.
    InternalError,
    /// The provided message data is invalid or unable to be deserialized.
    InvalidPayload,
    /// The connection is closed, refused or interrupted during the operation.
    ConnectionError,
    /// The operation took too long to be completed and was aborted.
    Timeout,
    /// The remote node does not know the leader of group 0.
    NoLeaderController,
    /// The remote node failed to forward the request to the group 0 leader.
    JoinRequestDispatchError,
    /// The remote node could not reach any seed server.
    SeedServersExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_status_variant(status: Status) {
        let bytes = rkyv::to_bytes::<_, 1024>(&status).expect("Serialize OK");
        let archived =
            rkyv::check_archived_root::<'_, Status>(&bytes).expect("Archive OK");
        assert_eq!(
            archived, &status,
            "Archived value and original value should match"
        );
        let copy: Status = rkyv::from_bytes(&bytes).expect("Deserialize OK");
        assert_eq!(
            copy, status,
            "Deserialized value and original value should match"
        );
    }

    #[test]
    fn test_variants() {
        test_status_variant(Status::invalid());
        test_status_variant(Status::timeout());
        test_status_variant(Status::connection("Connection refused."));
        test_status_variant(Status::new(
            ErrorCode::NoLeaderController,
            "No leader is currently known for group 0.",
        ));
        test_status_variant(Status::new(
            ErrorCode::JoinRequestDispatchError,
            "Leader unreachable.",
        ));
    }

    #[test]
    fn test_debug() {
        let status = Status::timeout();
        assert_eq!(
            format!("{status:?}"),
            "Status { code: Timeout, message: \"The operation took to long to be completed.\" }",
        );
    }

    #[test]
    fn test_display() {
        let status = Status::unavailable("Controller is starting.");
        assert_eq!(status.to_string(), "ServiceUnavailable: Controller is starting.");
    }
}
