//! Client handles used by queues.
//!
//! A [`MessagingClient`] stands for one connection. The transport is outside
//! the engine: frames written to a client land in an unbounded channel whose
//! receiving half belongs to the connection writer (or to a test).
//! A [`QueueClient`] is the per-queue view of a subscribed client.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::core::message::{current_timestamp, ClientFrame, QueueMessage};

/// Unique identifier for a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        ClientId(s.to_owned())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        ClientId(s)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ClientId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub struct MessagingClient {
    id: ClientId,
    sender: UnboundedSender<ClientFrame>,
    connected: AtomicBool,
    /// Names of the queues this client is subscribed to.
    subscriptions: DashSet<String>,
}

impl MessagingClient {
    /// Creates a connected client and returns the receiving half of its frame channel.
    pub fn new(id: impl Into<ClientId>) -> (Arc<Self>, UnboundedReceiver<ClientFrame>) {
        let (tx, rx) = unbounded_channel();
        let client = Arc::new(Self {
            id: id.into(),
            sender: tx,
            connected: AtomicBool::new(true),
            subscriptions: DashSet::new(),
        });
        (client, rx)
    }

    #[inline]
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Writes a frame to the connection. Returns false when the client is gone.
    pub fn send(&self, frame: ClientFrame) -> bool {
        if !self.connected.load(Ordering::Acquire) {
            return false;
        }
        self.sender.send(frame).is_ok()
    }

    pub(crate) fn add_subscription(&self, queue: &str) {
        self.subscriptions.insert(queue.to_owned());
    }

    pub(crate) fn remove_subscription(&self, queue: &str) {
        self.subscriptions.remove(queue);
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.iter().map(|q| q.key().clone()).collect()
    }
}

/// A client subscribed to one queue.
#[derive(Debug)]
pub struct QueueClient {
    client: Arc<MessagingClient>,
    joined_at: u64,
    /// Message sent to this client and not yet acknowledged.
    currently_processing: Mutex<Option<Arc<QueueMessage>>>,
}

impl QueueClient {
    pub fn new(client: Arc<MessagingClient>) -> Self {
        Self {
            client,
            joined_at: current_timestamp(),
            currently_processing: Mutex::new(None),
        }
    }

    #[inline]
    pub fn client(&self) -> &Arc<MessagingClient> {
        &self.client
    }

    #[inline]
    pub fn id(&self) -> &ClientId {
        self.client.id()
    }

    pub fn joined_at(&self) -> u64 {
        self.joined_at
    }

    pub fn is_processing(&self) -> bool {
        self.currently_processing.lock().is_some()
    }

    pub fn currently_processing(&self) -> Option<Arc<QueueMessage>> {
        self.currently_processing.lock().clone()
    }

    pub(crate) fn set_processing(&self, message: Arc<QueueMessage>) {
        *self.currently_processing.lock() = Some(message);
    }

    /// Clears the processing marker if it still points at `message`.
    pub(crate) fn clear_processing_if(&self, message: &Arc<QueueMessage>) -> bool {
        let mut current = self.currently_processing.lock();
        match current.as_ref() {
            Some(processing) if Arc::ptr_eq(processing, message) => {
                *current = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{generate_id, new_message, Acknowledgment};

    #[test]
    fn send_fails_after_disconnect() {
        let (client, mut rx) = MessagingClient::new("c1");
        assert!(client.send(ClientFrame::Acknowledgment(Acknowledgment::positive("q", "m"))));
        assert!(rx.try_recv().is_ok());

        client.disconnect();
        assert!(!client.is_connected());
        assert!(!client.send(ClientFrame::Acknowledgment(Acknowledgment::positive("q", "m"))));
    }

    #[test]
    fn processing_marker_only_clears_for_same_message() {
        let (client, _rx) = MessagingClient::new("c1");
        let queue_client = QueueClient::new(client);

        let first = Arc::new(QueueMessage::new(generate_id(), new_message("a"), None, None));
        let second = Arc::new(QueueMessage::new(generate_id(), new_message("b"), None, None));

        queue_client.set_processing(first.clone());
        assert!(!queue_client.clear_processing_if(&second));
        assert!(queue_client.is_processing());
        assert!(queue_client.clear_processing_if(&first));
        assert!(!queue_client.is_processing());
    }
}
