use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::core::client::MessagingClient;
use crate::core::decision::Decision;

/// Well-known header names understood by the queue engine.
pub mod headers {
    pub const ACKNOWLEDGE: &str = "Acknowledge";
    pub const QUEUE_NAME: &str = "Queue-Name";
    pub const QUEUE_TYPE: &str = "Queue-Type";
    pub const QUEUE_TOPIC: &str = "Queue-Topic";
    pub const PUT_BACK: &str = "Put-Back";
    pub const PUT_BACK_DELAY: &str = "Put-Back-Delay";
    pub const DELIVERY: &str = "Delivery";
    pub const QUEUE_MANAGER: &str = "Queue-Manager";
    pub const MESSAGE_TIMEOUT: &str = "Message-Timeout";
    pub const ACK_TIMEOUT: &str = "Ack-Timeout";
    pub const DELAY_BETWEEN_MESSAGES: &str = "Delay-Between-Messages";
    pub const CC: &str = "CC";
    pub const NEGATIVE_ACKNOWLEDGE_REASON: &str = "Negative-Acknowledge-Reason";

    /// Headers that configure the queue and must not reach consumers or storage.
    pub const OPERATIONAL: &[&str] = &[
        DELAY_BETWEEN_MESSAGES,
        ACKNOWLEDGE,
        QUEUE_NAME,
        QUEUE_TYPE,
        QUEUE_TOPIC,
        PUT_BACK,
        PUT_BACK_DELAY,
        DELIVERY,
        QUEUE_MANAGER,
        MESSAGE_TIMEOUT,
        ACK_TIMEOUT,
        CC,
    ];
}

/// Ordered key/value headers with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes every header whose name matches one of `keys`.
    pub fn remove_all(&mut self, keys: &[&str]) {
        self.0
            .retain(|(k, _)| !keys.iter().any(|key| k.eq_ignore_ascii_case(key)));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A message as handed over by a producer.
#[derive(Debug, Clone)]
pub struct Message {
    /// Producer-assigned id. The queue generates one when absent.
    pub id: Option<String>,
    pub payload: Bytes,
    pub headers: Headers,
    pub high_priority: bool,
    pub timestamp: u64,
}

pub fn new_message(payload: impl Into<Bytes>) -> Message {
    Message {
        id: None,
        payload: payload.into(),
        headers: Headers::new(),
        high_priority: false,
        timestamp: current_timestamp(),
    }
}

pub fn new_priority_message(payload: impl Into<Bytes>) -> Message {
    Message {
        high_priority: true,
        ..new_message(payload)
    }
}

impl Message {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generates a unique message id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A live message owned by a queue.
///
/// Lifecycle flags are atomics so deliveries, the trigger loop and
/// acknowledgment handling can observe them without locking the message.
#[derive(Debug)]
pub struct QueueMessage {
    id: String,
    payload: Bytes,
    headers: Headers,
    created_at: u64,
    deadline: Option<Instant>,
    source: Option<Arc<MessagingClient>>,

    high_priority: AtomicBool,
    in_store: AtomicBool,
    saved: AtomicBool,
    removed: AtomicBool,
    sent: AtomicBool,
    producer_ack_sent: AtomicBool,
    send_count: AtomicU32,
    decision: Mutex<Decision>,
}

impl QueueMessage {
    pub fn new(
        id: String,
        message: Message,
        source: Option<Arc<MessagingClient>>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            id,
            payload: message.payload,
            headers: message.headers,
            created_at: message.timestamp,
            deadline,
            source,
            high_priority: AtomicBool::new(message.high_priority),
            in_store: AtomicBool::new(false),
            saved: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            sent: AtomicBool::new(false),
            producer_ack_sent: AtomicBool::new(false),
            send_count: AtomicU32::new(0),
            decision: Mutex::new(Decision::allow()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Producer connection, if the message came from a client.
    pub fn source(&self) -> Option<&Arc<MessagingClient>> {
        self.source.as_ref()
    }

    pub fn is_high_priority(&self) -> bool {
        self.high_priority.load(Ordering::Acquire)
    }

    pub fn set_high_priority(&self, value: bool) {
        self.high_priority.store(value, Ordering::Release);
    }

    pub fn is_in_store(&self) -> bool {
        self.in_store.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_store(&self, value: bool) {
        self.in_store.store(value, Ordering::Release);
    }

    pub fn is_saved(&self) -> bool {
        self.saved.load(Ordering::Acquire)
    }

    pub(crate) fn set_saved(&self, value: bool) {
        self.saved.store(value, Ordering::Release);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Marks the message as removed; a removed message is never in a store.
    pub(crate) fn mark_as_removed(&self) {
        self.removed.store(true, Ordering::Release);
        self.in_store.store(false, Ordering::Release);
    }

    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::Acquire)
    }

    pub(crate) fn mark_sent(&self) {
        self.sent.store(true, Ordering::Release);
        self.send_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_count(&self) -> u32 {
        self.send_count.load(Ordering::Relaxed)
    }

    pub fn is_producer_ack_sent(&self) -> bool {
        self.producer_ack_sent.load(Ordering::Acquire)
    }

    pub(crate) fn set_producer_ack_sent(&self, value: bool) {
        self.producer_ack_sent.store(value, Ordering::Release);
    }

    /// Last decision recorded for the message.
    pub fn decision(&self) -> Decision {
        *self.decision.lock()
    }

    pub(crate) fn set_decision(&self, decision: Decision) {
        *self.decision.lock() = decision;
    }
}

/// Message frame handed to a consumer.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub queue: String,
    pub message_id: String,
    pub payload: Bytes,
    pub headers: Headers,
    pub high_priority: bool,
    /// True when the consumer must answer with an [`Acknowledgment`].
    pub ack_required: bool,
}

impl DeliveredMessage {
    pub fn from_queue_message(queue: &str, message: &QueueMessage, ack_required: bool) -> Self {
        Self {
            queue: queue.to_owned(),
            message_id: message.id().to_owned(),
            payload: message.payload().clone(),
            headers: message.headers().clone(),
            high_priority: message.is_high_priority(),
            ack_required,
        }
    }
}

/// Acknowledgment exchanged between consumers, the queue and producers.
///
/// An acknowledgment is negative when it carries a
/// [`NEGATIVE_ACKNOWLEDGE_REASON`](headers::NEGATIVE_ACKNOWLEDGE_REASON) header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgment {
    pub queue: String,
    pub message_id: String,
    pub headers: Headers,
}

impl Acknowledgment {
    pub fn positive(queue: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            message_id: message_id.into(),
            headers: Headers::new(),
        }
    }

    pub fn negative(
        queue: impl Into<String>,
        message_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut ack = Self::positive(queue, message_id);
        ack.headers
            .insert(headers::NEGATIVE_ACKNOWLEDGE_REASON, reason.into());
        ack
    }

    pub fn is_positive(&self) -> bool {
        !self.headers.contains(headers::NEGATIVE_ACKNOWLEDGE_REASON)
    }

    pub fn reason(&self) -> Option<&str> {
        self.headers.get(headers::NEGATIVE_ACKNOWLEDGE_REASON)
    }
}

/// Frames written to a client connection.
#[derive(Debug, Clone)]
pub enum ClientFrame {
    Message(DeliveredMessage),
    Acknowledgment(Acknowledgment),
}
