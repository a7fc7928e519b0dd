//! Per-exchange timing and byte accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Measures one exchange: elapsed time plus bytes moved in each direction.
///
/// The counters are atomic so the two halves of a tunnel splice can share
/// a collector through an `Arc` without further locking. A collector is
/// scoped to a single exchange and never persisted.
#[derive(Debug)]
pub struct MetricsCollector {
    started: Instant,
    sent: AtomicU64,
    received: AtomicU64,
}

impl MetricsCollector {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    /// Bytes the client pushed toward the destination.
    pub fn add_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Bytes the destination pushed back toward the client.
    pub fn add_received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_direction() {
        let metrics = MetricsCollector::start();
        metrics.add_sent(10);
        metrics.add_sent(5);
        metrics.add_received(3);
        assert_eq!(metrics.bytes_sent(), 15);
        assert_eq!(metrics.bytes_received(), 3);
    }

    #[test]
    fn elapsed_is_monotonic() {
        let metrics = MetricsCollector::start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(metrics.elapsed() >= Duration::from_millis(5));
    }
}
