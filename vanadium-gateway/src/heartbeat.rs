//! Heartbeat bookkeeping for a shard.
//!
//! From Hello onward the shard owes the gateway a heartbeat every
//! interval, and the gateway answers each one with an ack. This ledger
//! tracks when the next beat is due, whether the previous beat was ever
//! acknowledged (an unacked beat at the next deadline marks the
//! connection as a zombie), and the observed send-to-ack latency.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct HeartbeatState {
    /// Cadence advertised in Hello.
    interval: Duration,
    /// Deadline anchor for a connection that has not sent a beat yet.
    basis: Instant,
    /// When the last heartbeat was written to the socket.
    last_sent: Option<Instant>,
    /// Set while a heartbeat is waiting on its ack.
    awaiting_ack: bool,
    /// Send-to-ack time of the most recently acknowledged heartbeat.
    recent_rtt: Option<Duration>,
}

/// Per-shard heartbeat ledger.
#[derive(Debug)]
pub struct Heartbeats {
    state: Mutex<HeartbeatState>,
}

impl Heartbeats {
    /// Stand-in cadence until Hello advertises the real one, so the
    /// deadline math is always defined.
    const PLACEHOLDER_INTERVAL: Duration = Duration::from_secs(45);

    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeartbeatState {
                interval: Self::PLACEHOLDER_INTERVAL,
                basis: Instant::now(),
                last_sent: None,
                awaiting_ack: false,
                recent_rtt: None,
            }),
        }
    }

    /// Adopt the cadence from Hello and forget any beat owed on a
    /// previous connection.
    pub fn start_interval(&self, interval: Duration) {
        let mut state = self.state.lock();
        state.interval = interval;
        state.basis = Instant::now();
        state.last_sent = None;
        state.awaiting_ack = false;
    }

    /// The advertised cadence.
    pub fn interval(&self) -> Duration {
        self.state.lock().interval
    }

    /// When the next heartbeat is due: one interval after the last
    /// send, or after the start of the connection if nothing has been
    /// sent yet.
    pub fn next_deadline(&self) -> Instant {
        let state = self.state.lock();
        state.last_sent.unwrap_or(state.basis) + state.interval
    }

    /// Record a heartbeat written to the socket.
    pub fn record_sent(&self) {
        let mut state = self.state.lock();
        state.last_sent = Some(Instant::now());
        state.awaiting_ack = true;
    }

    /// Record the gateway's ack, capturing the round-trip time.
    pub fn record_ack(&self) {
        let mut state = self.state.lock();
        if state.awaiting_ack {
            state.awaiting_ack = false;
            state.recent_rtt = state.last_sent.map(|sent| sent.elapsed());
        }
    }

    /// Whether the previous heartbeat is still unacknowledged. Checked
    /// when the next beat comes due; true means the gateway has gone
    /// quiet and the connection must be replaced.
    pub fn is_zombie(&self) -> bool {
        self.state.lock().awaiting_ack
    }

    /// Send-to-ack time of the most recently acknowledged heartbeat.
    pub fn latency(&self) -> Option<Duration> {
        self.state.lock().recent_rtt
    }
}

impl Default for Heartbeats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_anchored_before_first_send() {
        let heartbeats = Heartbeats::new();
        let start = Instant::now();
        heartbeats.start_interval(Duration::from_secs(10));

        let deadline = heartbeats.next_deadline();
        advance(Duration::from_secs(3)).await;
        // The deadline must not slide while no beat has been sent.
        assert_eq!(heartbeats.next_deadline(), deadline);
        assert_eq!(deadline, start + Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_follows_sends() {
        let heartbeats = Heartbeats::new();
        heartbeats.start_interval(Duration::from_secs(10));

        advance(Duration::from_secs(4)).await;
        heartbeats.record_sent();
        assert_eq!(
            heartbeats.next_deadline(),
            Instant::now() + Duration::from_secs(10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zombie_until_acked() {
        let heartbeats = Heartbeats::new();
        assert!(!heartbeats.is_zombie());

        heartbeats.record_sent();
        assert!(heartbeats.is_zombie());
        assert!(heartbeats.latency().is_none());

        advance(Duration::from_millis(250)).await;
        heartbeats.record_ack();
        assert!(!heartbeats.is_zombie());
        assert_eq!(heartbeats.latency(), Some(Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_connection_forgets_pending_ack() {
        let heartbeats = Heartbeats::new();
        heartbeats.record_sent();
        assert!(heartbeats.is_zombie());

        // A reconnect must not inherit the unacked beat.
        heartbeats.start_interval(Duration::from_secs(41));
        assert!(!heartbeats.is_zombie());
        assert_eq!(heartbeats.interval(), Duration::from_secs(41));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stray_ack_is_ignored() {
        let heartbeats = Heartbeats::new();
        heartbeats.record_ack();
        assert!(heartbeats.latency().is_none());
    }
}
