use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::core::queue::QueueStatus;

/// Running counters of a queue.
#[derive(Debug, Default)]
pub struct QueueInfo {
    pub(crate) received: AtomicU64,
    pub(crate) sent: AtomicU64,
    pub(crate) acknowledged: AtomicU64,
    pub(crate) negative_acknowledged: AtomicU64,
    pub(crate) unacknowledged: AtomicU64,
    pub(crate) timed_out_messages: AtomicU64,
    pub(crate) put_back: AtomicU64,
    pub(crate) saved: AtomicU64,
    pub(crate) removed: AtomicU64,
    pub(crate) errors: AtomicU64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of a queue, counters plus gauges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueInfoSnapshot {
    pub name: String,
    pub status: QueueStatus,
    pub received: u64,
    pub sent: u64,
    pub acknowledged: u64,
    pub negative_acknowledged: u64,
    /// Deliveries whose acknowledgment deadline passed.
    pub unacknowledged: u64,
    pub timed_out_messages: u64,
    pub put_back: u64,
    pub saved: u64,
    pub removed: u64,
    pub errors: u64,
    pub pending_messages: usize,
    pub pending_priority_messages: usize,
    pub outstanding_deliveries: usize,
    pub clients: usize,
}

pub(crate) struct Gauges {
    pub pending_messages: usize,
    pub pending_priority_messages: usize,
    pub outstanding_deliveries: usize,
    pub clients: usize,
}

impl QueueInfo {
    pub(crate) fn snapshot(&self, name: &str, status: QueueStatus, gauges: Gauges) -> QueueInfoSnapshot {
        QueueInfoSnapshot {
            name: name.to_owned(),
            status,
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            negative_acknowledged: self.negative_acknowledged.load(Ordering::Relaxed),
            unacknowledged: self.unacknowledged.load(Ordering::Relaxed),
            timed_out_messages: self.timed_out_messages.load(Ordering::Relaxed),
            put_back: self.put_back.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            pending_messages: gauges.pending_messages,
            pending_priority_messages: gauges.pending_priority_messages,
            outstanding_deliveries: gauges.outstanding_deliveries,
            clients: gauges.clients,
        }
    }
}
