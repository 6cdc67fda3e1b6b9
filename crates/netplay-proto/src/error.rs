use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer too short")]
    TooShort,
    #[error("unexpected datagram kind byte {0:#04x}")]
    UnknownKind(u8),
    #[error("wrong length for kind {kind:?}: expected {expected}, got {actual}")]
    WrongLength {
        kind: char,
        expected: usize,
        actual: usize,
    },
    #[error("ping tail is not valid ASCII")]
    NonAsciiPingTail,
    #[error("malformed ping tail: {0:?}")]
    MalformedPingTail(String),
    #[error("malformed rendezvous START message: {0:?}")]
    MalformedRoster(String),
}
