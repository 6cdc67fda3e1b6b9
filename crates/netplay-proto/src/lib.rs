//! Wire protocol for peer bootstrap and lockstep input transport.
//!
//! This crate owns only the byte-level encode/decode rules shared by every
//! phase of the session: the datagram kinds in [`packet`] and the rendezvous
//! server's text protocol in [`rendezvous`]. It has no knowledge of sockets,
//! timing, or session state — see `netplay-session` for that.

pub mod constants;
pub mod error;
pub mod packet;
pub mod rendezvous;

pub use error::ProtoError;
pub use packet::DatagramView;
