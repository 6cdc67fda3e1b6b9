//! Session error types.

use thiserror::Error;

/// Fatal errors that tear down a session.
///
/// `TransientDrop` (a short packet, unknown first byte, or an out-of-phase
/// datagram) is deliberately absent: per the spec's error policy it is not an
/// error at all, just a silently-ignored packet, and is only ever logged at
/// `trace` level inside the loop that saw it.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not connect to rendezvous server: {0}")]
    ConnectFailure(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("hole punch timed out: confirmed {confirmed}/{total} peers")]
    HolePunchTimeout { confirmed: usize, total: usize },

    #[error("session aborted by host")]
    UserAbort,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<netplay_proto::ProtoError> for SessionError {
    fn from(e: netplay_proto::ProtoError) -> Self {
        SessionError::ProtocolViolation(e.to_string())
    }
}
