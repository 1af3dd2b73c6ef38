//! Queue managers bundle a queue's stores with its delivery handler.
//!
//! Managers are produced by named factories registered on the broker. The
//! factory name travels in the `Queue-Manager` header of the first message
//! pushed to a queue; `"Default"` resolves to [`MemoryQueueManager`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::core::delivery::{DefaultDeliveryHandler, DeliveryHandler};
use crate::core::message::{Headers, QueueMessage};
use crate::core::queue::options::QueueOptions;
use crate::core::store::{InMemoryMessageStore, MessageStore};

/// Name of the factory used when a push does not ask for one.
pub const DEFAULT_MANAGER: &str = "Default";

#[async_trait]
pub trait QueueManager: Send + Sync {
    fn message_store(&self) -> &dyn MessageStore;

    fn priority_message_store(&self) -> &dyn MessageStore;

    fn delivery_handler(&self) -> &Arc<dyn DeliveryHandler>;

    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Releases every resource held for the queue.
    async fn destroy(&self) -> anyhow::Result<()> {
        self.message_store().clear();
        self.priority_message_store().clear();
        self.delivery_handler().tracker().clear();
        Ok(())
    }

    /// Persists `message`. Returns true when it was saved.
    async fn save_message(&self, message: &QueueMessage) -> anyhow::Result<bool>;

    /// Removes `message` from whichever partition holds it.
    async fn remove_message(&self, message: &QueueMessage) -> anyhow::Result<bool> {
        Ok(self.priority_message_store().remove(message) || self.message_store().remove(message))
    }

    /// Inserts `message` into the partition matching its priority.
    fn add_message(&self, message: Arc<QueueMessage>) -> bool {
        if message.is_high_priority() {
            self.priority_message_store().add(message)
        } else {
            self.message_store().add(message)
        }
    }
}

/// Everything a factory gets to build a manager.
#[derive(Debug, Clone)]
pub struct QueueManagerBuilder {
    pub queue: String,
    pub manager: String,
    pub options: QueueOptions,
    /// Headers of the message that caused the initialization, if any.
    pub headers: Headers,
}

pub type QueueManagerFactory = Arc<
    dyn Fn(QueueManagerBuilder) -> BoxFuture<'static, anyhow::Result<Arc<dyn QueueManager>>>
        + Send
        + Sync,
>;

/// Two in-memory stores and the [`DefaultDeliveryHandler`].
pub struct MemoryQueueManager {
    messages: InMemoryMessageStore,
    priority_messages: InMemoryMessageStore,
    handler: Arc<dyn DeliveryHandler>,
}

impl MemoryQueueManager {
    pub fn new() -> Self {
        Self::with_handler(Arc::new(DefaultDeliveryHandler::new()))
    }

    pub fn with_handler(handler: Arc<dyn DeliveryHandler>) -> Self {
        Self {
            messages: InMemoryMessageStore::new(),
            priority_messages: InMemoryMessageStore::new(),
            handler,
        }
    }

    /// Factory registered under [`DEFAULT_MANAGER`].
    pub fn factory() -> QueueManagerFactory {
        Arc::new(
            |_builder: QueueManagerBuilder| -> BoxFuture<'static, anyhow::Result<Arc<dyn QueueManager>>> {
                async move { Ok(Arc::new(MemoryQueueManager::new()) as Arc<dyn QueueManager>) }.boxed()
            },
        )
    }
}

impl Default for MemoryQueueManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryQueueManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQueueManager")
            .field("messages", &self.messages.count())
            .field("priority_messages", &self.priority_messages.count())
            .finish()
    }
}

#[async_trait]
impl QueueManager for MemoryQueueManager {
    fn message_store(&self) -> &dyn MessageStore {
        &self.messages
    }

    fn priority_message_store(&self) -> &dyn MessageStore {
        &self.priority_messages
    }

    fn delivery_handler(&self) -> &Arc<dyn DeliveryHandler> {
        &self.handler
    }

    async fn save_message(&self, _message: &QueueMessage) -> anyhow::Result<bool> {
        Ok(true)
    }
}
