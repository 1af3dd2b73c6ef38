//! Pending-message storage.
//!
//! A queue keeps two stores, one for priority and one for regular messages.
//! Persistent implementations live outside the engine and plug in through
//! [`MessageStore`].

mod memory;

pub use memory::InMemoryMessageStore;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use crate::core::message::QueueMessage;

/// Storage for messages waiting to be delivered.
///
/// Implementations must be thread-safe; the trigger loop, producers and the
/// time keeper use a store concurrently.
pub trait MessageStore: Send + Sync + Debug {
    fn count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Appends a message. Returns false if the store refused it.
    fn add(&self, message: Arc<QueueMessage>) -> bool;

    /// Removes and returns the oldest message.
    fn consume_first(&self) -> Option<Arc<QueueMessage>>;

    /// Removes a specific message. Returns false if it was not stored.
    fn remove(&self, message: &QueueMessage) -> bool;

    /// Removes and returns every message whose deadline is at or before `now`.
    fn drain_expired(&self, now: Instant) -> Vec<Arc<QueueMessage>>;

    fn clear(&self);
}
