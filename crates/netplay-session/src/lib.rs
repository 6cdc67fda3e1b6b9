//! P2P session bootstrap and lockstep input transport.
//!
//! Composes the rendezvous handshake, NAT hole-punch, master-coordinated
//! time sync, and steady-state input broadcast behind a single cooperative
//! [`session::SessionManager`] that a host game loop pumps explicitly — see
//! [`session`] for the state machine and its three public operations.

pub mod broadcaster;
pub mod controls;
pub mod endpoint;
pub mod error;
pub mod hole_punch;
pub mod preferences;
pub mod rendezvous_client;
pub mod session;
pub mod time_sync;
pub mod transport;

pub use controls::Controls;
pub use error::SessionError;
pub use preferences::NetworkPreferences;
pub use session::{IdleOutcome, SessionManager, SessionState};
