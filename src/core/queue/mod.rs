//! The queue delivery engine.
//!
//! A [`Queue`] accepts produced messages, asks its delivery handler what to do
//! with them, keeps them in the manager's stores and drains the stores to its
//! subscribers through the bound [`QueueState`]. Acknowledgments and
//! deadlines are resolved through the delivery tracker and the time keeper.
//!
//! Locking:
//! - the FIFO lock (`queue_lock`) serializes initialization, replicated
//!   pushes, the syncing block and the trigger loop
//! - the acknowledgment lock serializes installation of the
//!   wait-for-acknowledge signal

mod ack;
mod apply;
mod clients;
pub mod info;
mod lifecycle;
pub mod manager;
pub mod options;
mod push;
pub mod state;
mod trigger;

pub use info::QueueInfoSnapshot;
pub use manager::{
    MemoryQueueManager, QueueManager, QueueManagerBuilder, QueueManagerFactory, DEFAULT_MANAGER,
};
pub use options::{
    CommitWhen, LimitExceededStrategy, QueueAckDecision, QueueDestroy, QueueOptions, QueueType,
};
pub use state::{PullRequest, PullResult, PullStatus, QueueState};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex, OwnedMutexGuard};

use crate::core::broker::Broker;
use crate::core::client::{ClientId, QueueClient};
use crate::core::delivery::DeliveryHandler;
use crate::core::message::QueueMessage;
use info::{Gauges, QueueInfo};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// No manager bound yet; the first push initializes the queue.
    #[default]
    NotInitialized,
    Running,
    /// Rejects pushes and delivers nothing.
    Paused,
    /// Rejects pushes, keeps delivering pending messages.
    OnlyConsume,
    /// Pushes wait until the queue leaves this status.
    Syncing,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushResult {
    Success,
    Error,
    LimitExceeded,
    StatusNotSupported,
    NoConsumers,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionResult {
    Success,
    Unauthorized,
    Full,
    Destroyed,
}

pub struct Queue {
    name: String,
    topic: RwLock<Option<String>>,
    broker: Arc<Broker>,

    status: RwLock<QueueStatus>,
    /// Only mutated while the queue is not initialized.
    options: RwLock<QueueOptions>,
    manager: OnceCell<Arc<dyn QueueManager>>,
    state: OnceCell<Box<dyn QueueState>>,

    queue_lock: Arc<AsyncMutex<()>>,
    /// FIFO lock held while the queue is syncing.
    sync_guard: Mutex<Option<OwnedMutexGuard<()>>>,
    /// Receiver of the signal installed by the last acknowledgment wait.
    ack_lock: AsyncMutex<Option<oneshot::Receiver<bool>>>,
    ack_signal: Mutex<Option<oneshot::Sender<bool>>>,

    triggering: AtomicBool,
    destroyed: AtomicBool,
    clients: RwLock<Vec<Arc<QueueClient>>>,
    maintenance: Mutex<Option<watch::Sender<bool>>>,
    pub(crate) info: QueueInfo,
}

impl Queue {
    pub(crate) fn new(name: impl Into<String>, options: QueueOptions, broker: Arc<Broker>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            topic: RwLock::new(None),
            broker,
            status: RwLock::new(QueueStatus::NotInitialized),
            options: RwLock::new(options),
            manager: OnceCell::new(),
            state: OnceCell::new(),
            queue_lock: Arc::new(AsyncMutex::new(())),
            sync_guard: Mutex::new(None),
            ack_lock: AsyncMutex::new(None),
            ack_signal: Mutex::new(None),
            triggering: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            clients: RwLock::new(Vec::new()),
            maintenance: Mutex::new(None),
            info: QueueInfo::default(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> Option<String> {
        self.topic.read().clone()
    }

    pub fn set_topic(&self, topic: Option<String>) {
        *self.topic.write() = topic;
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    #[inline]
    pub fn status(&self) -> QueueStatus {
        *self.status.read()
    }

    pub fn options(&self) -> QueueOptions {
        self.options.read().clone()
    }

    /// Replaces the options. Only possible before the queue is initialized.
    pub fn set_options(&self, options: QueueOptions) -> bool {
        if self.is_initialized() {
            return false;
        }
        *self.options.write() = options;
        true
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_triggering(&self) -> bool {
        self.triggering.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.manager.get().is_some()
    }

    pub fn manager(&self) -> Option<&Arc<dyn QueueManager>> {
        self.manager.get()
    }

    pub(crate) fn require_manager(&self) -> anyhow::Result<&Arc<dyn QueueManager>> {
        self.manager
            .get()
            .ok_or_else(|| anyhow::anyhow!("queue '{}' is not initialized", self.name))
    }

    pub fn delivery_handler(&self) -> Option<Arc<dyn DeliveryHandler>> {
        self.manager.get().map(|m| Arc::clone(m.delivery_handler()))
    }

    pub fn state(&self) -> Option<&dyn QueueState> {
        self.state.get().map(|s| s.as_ref())
    }

    pub fn clients(&self) -> Vec<Arc<QueueClient>> {
        self.clients.read().clone()
    }

    pub fn clients_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn find_client(&self, id: &ClientId) -> Option<Arc<QueueClient>> {
        self.clients.read().iter().find(|c| c.id() == id).cloned()
    }

    /// Number of pending messages in both partitions.
    pub fn message_count(&self) -> usize {
        self.manager.get().map_or(0, |m| {
            m.message_store().count() + m.priority_message_store().count()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.manager.get().map_or(true, |m| {
            m.message_store().is_empty() && m.priority_message_store().is_empty()
        })
    }

    pub fn info(&self) -> QueueInfoSnapshot {
        let gauges = match self.manager.get() {
            Some(manager) => Gauges {
                pending_messages: manager.message_store().count(),
                pending_priority_messages: manager.priority_message_store().count(),
                outstanding_deliveries: manager.delivery_handler().tracker().outstanding_count(),
                clients: self.clients_count(),
            },
            None => Gauges {
                pending_messages: 0,
                pending_priority_messages: 0,
                outstanding_deliveries: 0,
                clients: self.clients_count(),
            },
        };
        self.info.snapshot(&self.name, self.status(), gauges)
    }

    /// Takes the next pending message, priority partition first.
    pub(crate) fn consume_next(&self) -> Option<Arc<QueueMessage>> {
        let manager = self.manager.get()?;
        let message = manager
            .priority_message_store()
            .consume_first()
            .or_else(|| manager.message_store().consume_first())?;
        message.set_in_store(false);
        Some(message)
    }

    /// Inserts `message` into the store. Returns false if the store refused it.
    pub(crate) fn store_message(&self, message: &Arc<QueueMessage>) -> bool {
        let Some(manager) = self.manager.get() else {
            return false;
        };
        message.set_in_store(true);
        let added = manager.add_message(Arc::clone(message));
        if !added {
            message.set_in_store(false);
        }
        added
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("clients", &self.clients_count())
            .field("pending", &self.message_count())
            .finish()
    }
}
