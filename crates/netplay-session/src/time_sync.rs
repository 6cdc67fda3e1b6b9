//! Time Synchronizer (§4.3, §4.4): master (slot 0) and follower roles.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use netplay_proto::constants::{
    DELAY_BASE_FRAMES, DELAY_RTT_DIVISOR, START_TIME_WINDOW_CAPACITY, TIME_SYNC_DELAY_CUTOFF_MS,
    TIME_SYNC_PING_INTERVAL_MS, TIME_SYNC_SLEEP_MS, TIME_SYNC_START_OFFSET_MS,
};
use netplay_proto::packet::{self, DatagramView};
use tracing::{debug, info};

use crate::controls::Controls;
use crate::endpoint::{EndpointTable, Slot};
use crate::error::SessionError;
use crate::transport::Transport;

/// Deterministic anchor every peer seeds its RNG with at the end of sync (§4.4).
pub const RNG_SEED: u64 = 0;

/// One outstanding ping the master is waiting to have echoed back.
struct PingRecord {
    send_tick: Instant,
    target: Slot,
}

/// Per-peer latency accumulator (§3 Ping record).
#[derive(Default)]
struct LatencyAccumulator {
    response_count: u32,
    latency_sum_ms: u64,
}

impl LatencyAccumulator {
    fn avg_ms(&self) -> u64 {
        if self.response_count == 0 {
            0
        } else {
            self.latency_sum_ms / self.response_count as u64
        }
    }
}

/// The master-role half of time sync (slot 0).
pub struct TimeSyncMaster {
    session_id: u32,
    target_start: Instant,
    next_ping_id: u32,
    pings: HashMap<u32, PingRecord>,
    latencies: HashMap<Slot, LatencyAccumulator>,
    last_ping_emit: Option<Instant>,
    delay: u32,
}

impl TimeSyncMaster {
    pub fn new(session_id: u32) -> Self {
        Self {
            session_id,
            target_start: Instant::now() + Duration::from_millis(TIME_SYNC_START_OFFSET_MS as u64),
            next_ping_id: 0,
            pings: HashMap::new(),
            latencies: HashMap::new(),
            last_ping_emit: None,
            delay: 0,
        }
    }

    pub fn delay(&self) -> u32 {
        self.delay
    }

    /// Run one iteration: emit pings on the 10 ms cadence, drain echoes and
    /// late hole-punch packets, compute the delay once the deadline nears.
    /// Returns `true` once the target start tick has been reached.
    pub fn pump(
        &mut self,
        transport: &Transport,
        endpoints: &EndpointTable,
        controls: &mut dyn Controls,
    ) -> Result<bool, SessionError> {
        let now = Instant::now();
        let remaining = self.target_start.saturating_duration_since(now);

        let should_ping = self
            .last_ping_emit
            .map(|t| now.duration_since(t) >= Duration::from_millis(TIME_SYNC_PING_INTERVAL_MS as u64))
            .unwrap_or(true);
        if should_ping {
            self.last_ping_emit = Some(now);
            for peer in endpoints.other_slots().collect::<Vec<_>>() {
                self.send_ping(transport, endpoints, peer, remaining)?;
            }
        }

        let self_slot = endpoints.self_slot();
        let session_id = self.session_id;
        let mut echoes = Vec::new();
        let mut late_holepunches = Vec::new();
        transport.drain(|buf, src| match packet::decode(buf) {
            Ok(DatagramView::Ping { ping_id, .. }) => echoes.push((ping_id, src)),
            Ok(DatagramView::HolePunch { slot, .. }) => late_holepunches.push((slot, src)),
            _ => {}
        })?;

        for (ping_id, src) in echoes {
            if let Some(record) = self.pings.remove(&ping_id) {
                let latency_ms = now.duration_since(record.send_tick).as_millis() as u64;
                let acc = self.latencies.entry(record.target).or_default();
                acc.response_count += 1;
                acc.latency_sum_ms += latency_ms;
                debug!(ping_id, target = record.target, latency_ms, "ping echoed");
            }
        }
        for (_slot, src) in late_holepunches {
            let ack = packet::encode_hole_punch(true, session_id, self_slot);
            transport.send_to(&ack, src)?;
        }

        // Only compute once at least one peer has echoed a ping; otherwise
        // keep retrying every tick rather than publish a floor-only delay
        // derived from zero samples (§4.3, matches `if(player_nresponses[n])`
        // in the original accumulation).
        if self.delay == 0
            && remaining.as_millis() < TIME_SYNC_DELAY_CUTOFF_MS as u128
            && !self.latencies.is_empty()
        {
            let max_candidate = self
                .latencies
                .values()
                .map(|acc| acc.avg_ms() as u32 / DELAY_RTT_DIVISOR + DELAY_BASE_FRAMES)
                .max()
                .unwrap_or(DELAY_BASE_FRAMES);
            self.delay = max_candidate;
            controls.set_delay(self.delay);
            info!(delay = self.delay, "lockstep delay computed");
        }

        Ok(remaining.is_zero())
    }

    fn send_ping(
        &mut self,
        transport: &Transport,
        endpoints: &EndpointTable,
        target: Slot,
        remaining: Duration,
    ) -> Result<(), SessionError> {
        let Some(addr) = endpoints.address_of(target) else {
            return Ok(());
        };
        let half_rtt = self
            .latencies
            .get(&target)
            .map(|acc| acc.avg_ms() / 2)
            .unwrap_or(0);
        let advisory = remaining.as_millis() as i64 - half_rtt as i64;
        let advisory = advisory.max(0);

        let ping_id = self.next_ping_id;
        self.next_ping_id = self.next_ping_id.wrapping_add(1);
        self.pings.insert(
            ping_id,
            PingRecord {
                send_tick: Instant::now(),
                target,
            },
        );

        let buf = packet::encode_ping(self.session_id, ping_id, advisory, self.delay);
        transport.send_to(&buf, addr)?;
        Ok(())
    }

    pub fn sleep() -> Duration {
        Duration::from_millis(TIME_SYNC_SLEEP_MS)
    }
}

/// The follower-role half of time sync (every slot but 0).
pub struct TimeSyncFollower {
    session_id: u32,
    start_window: VecDeque<Instant>,
}

impl TimeSyncFollower {
    pub fn new(session_id: u32) -> Self {
        Self {
            session_id,
            start_window: VecDeque::with_capacity(START_TIME_WINDOW_CAPACITY),
        }
    }

    /// Run one iteration. Returns `true` once `now` reaches the mean of the
    /// accumulated start-time window (§4.4 termination rule).
    pub fn pump(
        &mut self,
        transport: &Transport,
        endpoints: &EndpointTable,
        controls: &mut dyn Controls,
    ) -> Result<bool, SessionError> {
        let self_slot = endpoints.self_slot();
        let session_id = self.session_id;
        let master = endpoints.address_of(0);

        let mut to_echo = Vec::new();
        let mut late_holepunches = Vec::new();
        transport.drain(|buf, src| match packet::decode(buf) {
            Ok(DatagramView::Ping {
                ping_id,
                start_in_ms,
                delay,
                ..
            }) => to_echo.push((ping_id, start_in_ms, delay, src)),
            Ok(DatagramView::HolePunch { slot, .. }) => late_holepunches.push((slot, src)),
            _ => {}
        })?;

        let now = Instant::now();
        for (ping_id, start_in_ms, delay, src) in to_echo {
            self.start_window
                .push_back(now + Duration::from_millis(start_in_ms.max(0) as u64));
            while self.start_window.len() > START_TIME_WINDOW_CAPACITY {
                self.start_window.pop_front();
            }
            if delay > 0 {
                controls.set_delay(delay);
            }
            let echo = packet::encode_ping(session_id, ping_id, start_in_ms, delay);
            if let Some(master_addr) = master {
                transport.send_to(&echo, master_addr)?;
            }
        }
        for (_slot, src) in late_holepunches {
            let ack = packet::encode_hole_punch(true, session_id, self_slot);
            transport.send_to(&ack, src)?;
        }

        if self.start_window.is_empty() {
            return Ok(false);
        }
        let mean = mean_instant(&self.start_window);
        Ok(Instant::now() >= mean)
    }

    pub fn sleep() -> Duration {
        Duration::from_millis(TIME_SYNC_SLEEP_MS)
    }
}

fn mean_instant(window: &VecDeque<Instant>) -> Instant {
    let earliest = *window.iter().min().unwrap();
    let total_nanos: u128 = window
        .iter()
        .map(|t| t.duration_since(earliest).as_nanos())
        .sum();
    let avg_nanos = total_nanos / window.len() as u128;
    earliest + Duration::from_nanos(avg_nanos as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::test_support::RecordingControls;
    use std::net::SocketAddr;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn mean_instant_is_between_bounds() {
        let base = Instant::now();
        let mut window = VecDeque::new();
        window.push_back(base);
        window.push_back(base + Duration::from_millis(100));
        let m = mean_instant(&window);
        assert!(m >= base && m <= base + Duration::from_millis(100));
    }

    #[test]
    fn master_and_follower_converge_on_a_delay() {
        let t0 = Transport::bind_ephemeral().unwrap();
        let t1 = Transport::bind_ephemeral().unwrap();
        let p0 = t0.local_port().unwrap();
        let p1 = t1.local_port().unwrap();

        let e0 = EndpointTable::new(0, vec![addr(p0), addr(p1)]);
        let e1 = EndpointTable::new(1, vec![addr(p0), addr(p1)]);

        let mut master = TimeSyncMaster::new(99);
        let mut follower = TimeSyncFollower::new(99);
        let mut c0 = RecordingControls::new(2);
        let mut c1 = RecordingControls::new(2);

        let mut master_done = false;
        let mut follower_done = false;
        for _ in 0..2000 {
            if !master_done {
                master_done = master.pump(&t0, &e0, &mut c0).unwrap();
            }
            if !follower_done {
                follower_done = follower.pump(&t1, &e1, &mut c1).unwrap();
            }
            std::thread::sleep(Duration::from_millis(1));
            if master_done && follower_done {
                break;
            }
        }
        assert!(master_done);
        assert!(follower_done);
        assert!(master.delay() >= DELAY_BASE_FRAMES);
    }

    #[test]
    fn delay_stays_unset_without_any_echo() {
        let t0 = Transport::bind_ephemeral().unwrap();
        // Peer slot with nothing listening: pings go out, nothing ever echoes.
        let dead_port = {
            let t = Transport::bind_ephemeral().unwrap();
            t.local_port().unwrap()
        };
        let e0 = EndpointTable::new(0, vec![addr(t0.local_port().unwrap()), addr(dead_port)]);

        let mut master = TimeSyncMaster::new(7);
        let mut c0 = RecordingControls::new(2);

        // Run well past the 500ms cutoff without ever receiving an echo.
        for _ in 0..700 {
            master.pump(&t0, &e0, &mut c0).unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(master.delay(), 0);
        assert_eq!(c0.delay, 0);
    }
}
