//! Statistics tracking for received loop packets.
//!
//! Counts what happened to each message (rendered, rejected, failed to
//! write) and keeps a histogram of payload sizes.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe statistics collector for the subscriber.
#[derive(Debug)]
pub struct MessageStats {
    /// Messages received on the topic
    pub messages_received: AtomicU64,

    /// Readings rendered and written to disk
    pub readings_written: AtomicU64,

    /// Payloads that failed to parse
    pub parse_failures: AtomicU64,

    /// Readings that could not be written
    pub write_failures: AtomicU64,

    /// Total payload bytes received
    pub bytes_received: AtomicU64,

    /// Number of broker connections established
    pub connections: AtomicU64,

    /// Histogram of payload sizes in bytes
    size_histogram: RwLock<Histogram<u64>>,

    /// When stats collection started
    start_time: Instant,
}

impl MessageStats {
    /// Create a new statistics collector.
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            readings_written: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            // Loop packets are a few hundred bytes; allow up to 64KB
            size_histogram: RwLock::new(
                Histogram::new_with_bounds(1, 65_536, 3).expect("Failed to create size histogram"),
            ),
            start_time: Instant::now(),
        }
    }

    /// Record a received message of the given payload size.
    pub fn record_message(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);

        if let Ok(mut hist) = self.size_histogram.write() {
            let _ = hist.record((bytes as u64).clamp(1, 65_536));
        }
    }

    pub fn record_written(&self) {
        self.readings_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the elapsed time since stats collection started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Generate a summary report.
    pub fn summary(&self) -> StatsSummary {
        let size_percentiles = self
            .size_histogram
            .read()
            .ok()
            .filter(|h| h.len() > 0)
            .map(|h| SizePercentiles {
                p50: h.value_at_quantile(0.50),
                p99: h.value_at_quantile(0.99),
                min: h.min(),
                max: h.max(),
                mean: h.mean(),
            });

        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            readings_written: self.readings_written.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            size_percentiles,
        }
    }
}

impl Default for MessageStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile values from the payload size histogram.
#[derive(Debug, Clone, Serialize)]
pub struct SizePercentiles {
    pub p50: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub messages_received: u64,
    pub readings_written: u64,
    pub parse_failures: u64,
    pub write_failures: u64,
    pub bytes_received: u64,
    pub connections: u64,
    pub size_percentiles: Option<SizePercentiles>,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(f, "Connections: {}", self.connections)?;
        writeln!(f, "Messages received: {}", self.messages_received)?;
        writeln!(f, "Readings written: {}", self.readings_written)?;
        writeln!(f, "Parse failures: {}", self.parse_failures)?;
        writeln!(f, "Write failures: {}", self.write_failures)?;
        writeln!(f, "Bytes received: {}", self.bytes_received)?;

        if let Some(ref p) = self.size_percentiles {
            writeln!(f, "Payload size (bytes):")?;
            writeln!(f, "  Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "  P50: {}, P99: {}", p.p50, p.p99)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_message() {
        let stats = MessageStats::new();

        stats.record_message(250);
        stats.record_message(350);

        assert_eq!(stats.messages_received.load(Ordering::Relaxed), 2);
        assert_eq!(stats.bytes_received.load(Ordering::Relaxed), 600);
    }

    #[test]
    fn test_empty_summary_has_no_percentiles() {
        let summary = MessageStats::new().summary();

        assert_eq!(summary.messages_received, 0);
        assert!(summary.size_percentiles.is_none());
        assert!(!summary.to_string().contains("Payload size"));
    }

    #[test]
    fn test_summary_generation() {
        let stats = MessageStats::new();

        for _ in 0..10 {
            stats.record_message(300);
            stats.record_written();
        }
        stats.record_message(20);
        stats.record_parse_failure();
        stats.record_write_failure();
        stats.record_connection();

        let summary = stats.summary();

        assert_eq!(summary.messages_received, 11);
        assert_eq!(summary.readings_written, 10);
        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.write_failures, 1);
        assert_eq!(summary.connections, 1);

        let sizes = summary.size_percentiles.as_ref().unwrap();
        assert_eq!(sizes.min, 20);
        assert!(sizes.max >= 300);
        assert!(summary.to_string().contains("Readings written: 10"));
    }
}
