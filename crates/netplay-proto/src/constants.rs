//! Wire constants for the bootstrap/lockstep datagram protocol.
//!
//! For datagram kind bytes, see [`crate::packet`].

/// Rendezvous server reliable-stream port.
pub const RENDEZVOUS_TCP_PORT: u16 = 17002;

/// Rendezvous server datagram port (used for `'Z'` keepalives and `'.'` port probes).
pub const RENDEZVOUS_UDP_PORT: u16 = 17001;

/// Byte length of a session identifier on the wire.
pub const SESSION_ID_LEN: usize = 4;

/// Fixed length of a hole-punch confirmation datagram (`'A'`/`'a'`).
pub const HOLE_PUNCH_LEN: usize = 6;

/// Fixed length of the server keepalive datagram (`'Z'`).
pub const KEEPALIVE_LEN: usize = 5;

/// Minimum length of a ping/echo datagram (`'P'`); anything at or below this has no tail.
pub const PING_MIN_LEN: usize = 6;

/// Minimum length of a control datagram (`'C'`); anything shorter carries no payload.
pub const CONTROL_MIN_LEN: usize = 5;

/// Hole-punch confirmation loop: number of 10 ms cycles before giving up.
pub const HOLE_PUNCH_MAX_CYCLES: u32 = 1000;

/// Hole-punch confirmation loop: sleep between cycles.
pub const HOLE_PUNCH_CYCLE_MS: u64 = 10;

/// Hole-punch confirmation loop: extra cycles run after everyone is confirmed.
pub const HOLE_PUNCH_GRACE_CYCLES: u32 = 50;

/// Hole-punch confirmation loop: port-scan fallback kicks in on cycles past this one,
/// then every [`HOLE_PUNCH_PORTSCAN_CADENCE`] cycles.
pub const HOLE_PUNCH_PORTSCAN_START: u32 = 100;

/// Cadence (in cycles) of the port-scan fallback.
pub const HOLE_PUNCH_PORTSCAN_CADENCE: u32 = 100;

/// Port-scan fallback offset range relative to the announced port, `[lo, hi)`.
pub const HOLE_PUNCH_PORTSCAN_OFFSET_LO: i32 = -5;
pub const HOLE_PUNCH_PORTSCAN_OFFSET_HI: i32 = 100;

/// Ports at or below this are never scanned.
pub const PORTSCAN_MIN_PORT: u32 = 1024;

/// Ports at or above this are never scanned.
pub const PORTSCAN_MAX_PORT: u32 = 65536;

/// Time synchronizer: how far in the future the master fixes the start tick.
pub const TIME_SYNC_START_OFFSET_MS: u32 = 1000;

/// Time synchronizer: master pings each peer this often.
pub const TIME_SYNC_PING_INTERVAL_MS: u32 = 10;

/// Time synchronizer: sync loop sleeps this long between iterations.
pub const TIME_SYNC_SLEEP_MS: u64 = 1;

/// Time synchronizer: once remaining time drops below this, the lockstep delay is computed.
pub const TIME_SYNC_DELAY_CUTOFF_MS: u32 = 500;

/// Time synchronizer: divisor applied to average RTT when deriving the delay candidate.
pub const DELAY_RTT_DIVISOR: u32 = 40;

/// Time synchronizer: constant floor added to every delay candidate.
pub const DELAY_BASE_FRAMES: u32 = 2;

/// Follower start-time window capacity (number of advisories retained).
pub const START_TIME_WINDOW_CAPACITY: usize = 5;

/// Milliseconds of artificial lag represented by one queued frame-slot.
pub const LAG_FRAME_MS: u32 = 20;
