//! Metrics collection for object store operations.
//!
//! Tracks request counts, bytes transferred and time spent per operation so a
//! run can report what it moved.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Object store operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Put,
    Delete,
}

impl StoreOp {
    fn index(self) -> usize {
        match self {
            StoreOp::Get => 0,
            StoreOp::Put => 1,
            StoreOp::Delete => 2,
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Get => "get",
            StoreOp::Put => "put",
            StoreOp::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct OpCounters {
    requests: AtomicU64,
    bytes: AtomicU64,
    time_ns: AtomicU64,
}

/// Collector for object store metrics.
///
/// Thread-safe; one collector can be shared by every clone of a client.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    ops: [OpCounters; 3],
}

/// Point-in-time copy of the counters for one operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpSnapshot {
    pub requests: u64,
    pub bytes: u64,
    pub time: Duration,
}

impl StoreMetrics {
    /// Create a new metrics collector wrapped in Arc for sharing
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a completed request
    pub fn record(&self, op: StoreOp, bytes: u64, duration: Duration) {
        let counters = &self.ops[op.index()];
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters.bytes.fetch_add(bytes, Ordering::Relaxed);
        counters
            .time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, op: StoreOp) -> OpSnapshot {
        let counters = &self.ops[op.index()];
        OpSnapshot {
            requests: counters.requests.load(Ordering::Relaxed),
            bytes: counters.bytes.load(Ordering::Relaxed),
            time: Duration::from_nanos(counters.time_ns.load(Ordering::Relaxed)),
        }
    }

    /// Total number of requests across all operations
    pub fn request_count(&self) -> u64 {
        [StoreOp::Get, StoreOp::Put, StoreOp::Delete]
            .into_iter()
            .map(|op| self.snapshot(op).requests)
            .sum()
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        let get = self.snapshot(StoreOp::Get);
        let put = self.snapshot(StoreOp::Put);
        let delete = self.snapshot(StoreOp::Delete);
        format!(
            "{} get ({} bytes, {:.2?}), {} put ({} bytes, {:.2?}), {} delete ({:.2?})",
            get.requests,
            get.bytes,
            get.time,
            put.requests,
            put.bytes,
            put.time,
            delete.requests,
            delete.time
        )
    }
}
