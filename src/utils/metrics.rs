//! Observability and Metrics
//!
//! Process-wide counters for datagram traffic, reassembly, handshakes and the
//! pending queue. Uses atomic counters so every endpoint can record without
//! coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Global metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Datagrams handed to the socket
    pub datagrams_sent: AtomicU64,
    /// Datagrams read from the socket
    pub datagrams_received: AtomicU64,
    /// Bytes handed to the socket
    pub bytes_sent: AtomicU64,
    /// Bytes read from the socket
    pub bytes_received: AtomicU64,
    /// Whole messages sent
    pub messages_sent: AtomicU64,
    /// Whole messages reassembled
    pub messages_received: AtomicU64,
    /// Messages that needed more than one datagram
    pub fragmented_messages: AtomicU64,
    /// Reassemblies abandoned for a missing fragment
    pub missing_fragments: AtomicU64,
    /// Total handshake attempts
    pub handshakes_total: AtomicU64,
    /// Successful handshakes
    pub handshakes_success: AtomicU64,
    /// Failed handshakes
    pub handshakes_failed: AtomicU64,
    /// Datagrams parked for another peer
    pub pending_queued: AtomicU64,
    /// Parked datagrams dropped because the queue was full
    pub pending_evicted: AtomicU64,
    /// Disconnections observed or sent
    pub disconnections: AtomicU64,
    /// Sessions currently served by a listener
    pub sessions_active: AtomicU64,
    /// Listener sessions that ended with an error or panicked
    pub sessions_failed: AtomicU64,
    /// Malformed datagrams, unknown tags, type mismatches
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            datagrams_sent: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            fragmented_messages: AtomicU64::new(0),
            missing_fragments: AtomicU64::new(0),
            handshakes_total: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            pending_queued: AtomicU64::new(0),
            pending_evicted: AtomicU64::new(0),
            disconnections: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a datagram sent
    pub fn datagram_sent(&self, byte_count: u64) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a datagram received
    pub fn datagram_received(&self, byte_count: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a message sent as `fragments` datagrams
    pub fn message_sent(&self, fragments: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        if fragments > 1 {
            self.fragmented_messages.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a message reassembled
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an abandoned reassembly
    pub fn missing_fragment(&self) {
        self.missing_fragments.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handshake attempt
    pub fn handshake_attempt(&self) {
        self.handshakes_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful handshake
    pub fn handshake_success(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed handshake
    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a datagram parked for another peer
    pub fn pending_queued(&self) {
        self.pending_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a parked datagram dropped on overflow
    pub fn pending_evicted(&self) {
        self.pending_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a disconnection
    pub fn disconnection(&self) {
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a listener session starting
    pub fn session_started(&self) {
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a listener session ending
    pub fn session_finished(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a listener session that did not finish cleanly
    pub fn session_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a protocol error
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            fragmented_messages: self.fragmented_messages.load(Ordering::Relaxed),
            missing_fragments: self.missing_fragments.load(Ordering::Relaxed),
            handshakes_total: self.handshakes_total.load(Ordering::Relaxed),
            handshakes_success: self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            pending_queued: self.pending_queued.load(Ordering::Relaxed),
            pending_evicted: self.pending_evicted.load(Ordering::Relaxed),
            disconnections: self.disconnections.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            datagrams_sent = snapshot.datagrams_sent,
            datagrams_received = snapshot.datagrams_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            messages_sent = snapshot.messages_sent,
            messages_received = snapshot.messages_received,
            fragmented_messages = snapshot.fragmented_messages,
            missing_fragments = snapshot.missing_fragments,
            handshakes_total = snapshot.handshakes_total,
            handshakes_success = snapshot.handshakes_success,
            handshakes_failed = snapshot.handshakes_failed,
            pending_queued = snapshot.pending_queued,
            pending_evicted = snapshot.pending_evicted,
            disconnections = snapshot.disconnections,
            sessions_active = snapshot.sessions_active,
            sessions_failed = snapshot.sessions_failed,
            protocol_errors = snapshot.protocol_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Protocol metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub fragmented_messages: u64,
    pub missing_fragments: u64,
    pub handshakes_total: u64,
    pub handshakes_success: u64,
    pub handshakes_failed: u64,
    pub pending_queued: u64,
    pub pending_evicted: u64,
    pub disconnections: u64,
    pub sessions_active: u64,
    pub sessions_failed: u64,
    pub protocol_errors: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragmented_counted_only_above_one() {
        let metrics = Metrics::new();
        metrics.message_sent(1);
        metrics.message_sent(4);
        let snap = metrics.snapshot();
        assert_eq!(snap.messages_sent, 2);
        assert_eq!(snap.fragmented_messages, 1);
    }

    #[test]
    fn test_session_gauge() {
        let metrics = Metrics::new();
        metrics.session_started();
        metrics.session_started();
        metrics.session_finished();
        assert_eq!(metrics.snapshot().sessions_active, 1);
    }
}
