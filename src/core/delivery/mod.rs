//! Message deliveries: one message handed to one client, pending resolution.

pub mod handler;
pub mod time_keeper;
pub mod tracker;

pub use handler::{DefaultDeliveryHandler, DeliveryHandler};
pub use tracker::DeliveryTracker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::core::client::QueueClient;
use crate::core::message::QueueMessage;

/// Resolution state of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryAcknowledge {
    Pending,
    Acknowledged,
    NegativeAcknowledged,
    Timeout,
}

#[derive(Debug)]
pub struct MessageDelivery {
    message: Arc<QueueMessage>,
    receiver: Option<Arc<QueueClient>>,
    send_time: Instant,
    deadline: Option<Instant>,
    sent: AtomicBool,
    acknowledge: Mutex<DeliveryAcknowledge>,
}

impl MessageDelivery {
    pub fn new(
        message: Arc<QueueMessage>,
        receiver: Option<Arc<QueueClient>>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            message,
            receiver,
            send_time: Instant::now(),
            deadline,
            sent: AtomicBool::new(false),
            acknowledge: Mutex::new(DeliveryAcknowledge::Pending),
        }
    }

    pub fn message(&self) -> &Arc<QueueMessage> {
        &self.message
    }

    pub fn receiver(&self) -> Option<&Arc<QueueClient>> {
        self.receiver.as_ref()
    }

    pub fn send_time(&self) -> Instant {
        self.send_time
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::Acquire)
    }

    pub(crate) fn mark_as_sent(&self) {
        self.sent.store(true, Ordering::Release);
    }

    pub fn acknowledge(&self) -> DeliveryAcknowledge {
        *self.acknowledge.lock()
    }

    pub(crate) fn mark_as_acknowledged(&self, success: bool) {
        *self.acknowledge.lock() = if success {
            DeliveryAcknowledge::Acknowledged
        } else {
            DeliveryAcknowledge::NegativeAcknowledged
        };
    }

    pub(crate) fn mark_as_timed_out(&self) {
        *self.acknowledge.lock() = DeliveryAcknowledge::Timeout;
    }
}
