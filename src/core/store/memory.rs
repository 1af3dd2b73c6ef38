use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::core::message::QueueMessage;
use crate::core::store::MessageStore;

/// FIFO store backed by a `VecDeque`.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<VecDeque<Arc<QueueMessage>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
        }
    }
}

impl MessageStore for InMemoryMessageStore {
    fn count(&self) -> usize {
        self.messages.lock().len()
    }

    fn add(&self, message: Arc<QueueMessage>) -> bool {
        self.messages.lock().push_back(message);
        true
    }

    fn consume_first(&self) -> Option<Arc<QueueMessage>> {
        self.messages.lock().pop_front()
    }

    fn remove(&self, message: &QueueMessage) -> bool {
        let mut messages = self.messages.lock();
        match messages.iter().position(|m| m.id() == message.id()) {
            Some(index) => messages.remove(index).is_some(),
            None => false,
        }
    }

    fn drain_expired(&self, now: Instant) -> Vec<Arc<QueueMessage>> {
        let mut messages = self.messages.lock();
        if !messages.iter().any(|m| m.is_expired(now)) {
            return Vec::new();
        }

        let mut expired = Vec::new();
        messages.retain(|m| {
            if m.is_expired(now) {
                expired.push(Arc::clone(m));
                false
            } else {
                true
            }
        });
        expired
    }

    fn clear(&self) {
        self.messages.lock().clear();
    }
}
