//! Connection counters.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters updated by the manager task and by `send`.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    connect_attempts: AtomicU64,
    opens: AtomicU64,
    reconnects_scheduled: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
    handler_failures: AtomicU64,
    exhaustions: AtomicU64,
    current_attempt: AtomicU32,
}

fn bump(counter: &AtomicU64) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

impl ConnectionStats {
    pub(crate) fn record_connect_attempt(&self) {
        bump(&self.connect_attempts);
    }

    pub(crate) fn record_open(&self) {
        bump(&self.opens);
    }

    pub(crate) fn record_reconnect_scheduled(&self) {
        bump(&self.reconnects_scheduled);
    }

    pub(crate) fn record_frame_received(&self) {
        bump(&self.frames_received);
    }

    pub(crate) fn record_frame_dropped(&self) {
        bump(&self.frames_dropped);
    }

    pub(crate) fn record_frame_sent(&self) {
        bump(&self.frames_sent);
    }

    pub(crate) fn record_send_failure(&self) {
        bump(&self.send_failures);
    }

    pub(crate) fn record_handler_failures(&self, count: usize) {
        if count > 0 {
            let _ = self
                .handler_failures
                .fetch_add(u64::try_from(count).unwrap_or(u64::MAX), Ordering::Relaxed);
        }
    }

    pub(crate) fn record_exhausted(&self) {
        bump(&self.exhaustions);
    }

    pub(crate) fn set_current_attempt(&self, attempt: u32) {
        self.current_attempt.store(attempt, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            exhaustions: self.exhaustions.load(Ordering::Relaxed),
            current_attempt: self.current_attempt.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of [`ConnectionStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Open attempts started, including the first.
    pub connect_attempts: u64,
    /// Attempts that reached `Open`.
    pub opens: u64,
    /// Retry timers armed.
    pub reconnects_scheduled: u64,
    /// Inbound frames seen.
    pub frames_received: u64,
    /// Inbound frames discarded as undecodable.
    pub frames_dropped: u64,
    /// Outbound frames queued on an open link.
    pub frames_sent: u64,
    /// `send` calls that returned `false`.
    pub send_failures: u64,
    /// Subscriber calls that errored or panicked.
    pub handler_failures: u64,
    /// Times the retry ceiling was reached.
    pub exhaustions: u64,
    /// Retries consumed in the current failure streak.
    pub current_attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(ConnectionStats::default().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn records_accumulate() {
        let stats = ConnectionStats::default();
        stats.record_connect_attempt();
        stats.record_connect_attempt();
        stats.record_frame_dropped();
        stats.record_handler_failures(0);
        stats.record_handler_failures(3);
        stats.set_current_attempt(2);
        let snap = stats.snapshot();
        assert_eq!(snap.connect_attempts, 2);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.handler_failures, 3);
        assert_eq!(snap.current_attempt, 2);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
        assert!(json.get("framesDropped").is_some());
        assert!(json.get("currentAttempt").is_some());
    }
}
