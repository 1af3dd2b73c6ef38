//! Queue registry and the collaborators shared by every queue.
//!
//! The broker owns the queues by name together with the manager factories,
//! authenticators, observers, the error sink, the cluster notifier and the
//! event bus. Queues hold an `Arc<Broker>`; a destroyed queue unregisters
//! itself, which releases the broker's reference to it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::core::auth::QueueAuthenticator;
use crate::core::client::MessagingClient;
use crate::core::cluster::{ClusterNotifier, StandaloneCluster};
use crate::core::error::QueueError;
use crate::core::events::{ErrorHandler, QueueEvent, QueueEventHandler, QueueMessageEventHandler};
use crate::core::message::{Message, QueueMessage};
use crate::core::queue::manager::{MemoryQueueManager, QueueManagerFactory, DEFAULT_MANAGER};
use crate::core::queue::options::QueueOptions;
use crate::core::queue::{PushResult, Queue};

/// Broker-wide settings (`[broker]` in the config file).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerOptions {
    /// Period of the per-queue task that re-arms triggers and checks auto-destroy.
    pub maintenance_interval_ms: u64,
    /// Period of the deadline scan.
    pub time_keeper_interval_ms: u64,
    /// Delay before a message is put back after a pipeline error.
    pub error_put_back_delay_ms: u64,
    /// Manager factory used when a push does not name one.
    pub default_manager: String,
    pub event_capacity: usize,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            maintenance_interval_ms: 5_000,
            time_keeper_interval_ms: 1_000,
            error_put_back_delay_ms: 1_000,
            default_manager: DEFAULT_MANAGER.to_owned(),
            event_capacity: 1_024,
        }
    }
}

impl BrokerOptions {
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms.max(1))
    }

    pub fn time_keeper_interval(&self) -> Duration {
        Duration::from_millis(self.time_keeper_interval_ms.max(1))
    }

    pub fn error_put_back_delay(&self) -> Duration {
        Duration::from_millis(self.error_put_back_delay_ms)
    }
}

pub struct Broker {
    options: BrokerOptions,
    default_queue_options: RwLock<QueueOptions>,
    queues: DashMap<String, Arc<Queue>>,
    manager_factories: DashMap<String, QueueManagerFactory>,
    authenticators: RwLock<Vec<Arc<dyn QueueAuthenticator>>>,
    queue_event_handlers: RwLock<Vec<Arc<dyn QueueEventHandler>>>,
    message_event_handlers: RwLock<Vec<Arc<dyn QueueMessageEventHandler>>>,
    error_handlers: RwLock<Vec<Arc<dyn ErrorHandler>>>,
    cluster: RwLock<Arc<dyn ClusterNotifier>>,
    events: broadcast::Sender<QueueEvent>,
}

impl Broker {
    pub fn new(options: BrokerOptions) -> Arc<Self> {
        Self::with_queue_options(options, QueueOptions::default())
    }

    pub fn with_queue_options(options: BrokerOptions, queue_options: QueueOptions) -> Arc<Self> {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let broker = Self {
            options,
            default_queue_options: RwLock::new(queue_options),
            queues: DashMap::new(),
            manager_factories: DashMap::new(),
            authenticators: RwLock::new(Vec::new()),
            queue_event_handlers: RwLock::new(Vec::new()),
            message_event_handlers: RwLock::new(Vec::new()),
            error_handlers: RwLock::new(Vec::new()),
            cluster: RwLock::new(Arc::new(StandaloneCluster)),
            events,
        };
        broker
            .manager_factories
            .insert(DEFAULT_MANAGER.to_owned(), MemoryQueueManager::factory());
        Arc::new(broker)
    }

    pub fn from_config(config: &Config) -> Arc<Self> {
        Self::with_queue_options(config.broker.clone(), config.queues.clone())
    }

    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }

    /// Options given to queues created without explicit ones.
    pub fn default_queue_options(&self) -> QueueOptions {
        self.default_queue_options.read().clone()
    }

    pub fn set_default_queue_options(&self, options: QueueOptions) {
        *self.default_queue_options.write() = options;
    }

    // ───────────────────────────────────────────────────────────
    // Collaborators
    // ───────────────────────────────────────────────────────────

    pub fn register_manager_factory(&self, name: impl Into<String>, factory: QueueManagerFactory) {
        self.manager_factories.insert(name.into(), factory);
    }

    pub(crate) fn manager_factory(&self, name: &str) -> Option<QueueManagerFactory> {
        self.manager_factories
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn add_authenticator(&self, authenticator: Arc<dyn QueueAuthenticator>) {
        self.authenticators.write().push(authenticator);
    }

    pub fn add_queue_event_handler(&self, handler: Arc<dyn QueueEventHandler>) {
        self.queue_event_handlers.write().push(handler);
    }

    pub fn add_message_event_handler(&self, handler: Arc<dyn QueueMessageEventHandler>) {
        self.message_event_handlers.write().push(handler);
    }

    pub fn add_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        self.error_handlers.write().push(handler);
    }

    pub fn set_cluster(&self, cluster: Arc<dyn ClusterNotifier>) {
        *self.cluster.write() = cluster;
    }

    pub fn cluster(&self) -> Arc<dyn ClusterNotifier> {
        self.cluster.read().clone()
    }

    pub(crate) fn authenticators(&self) -> Vec<Arc<dyn QueueAuthenticator>> {
        self.authenticators.read().clone()
    }

    pub(crate) fn queue_event_handlers(&self) -> Vec<Arc<dyn QueueEventHandler>> {
        self.queue_event_handlers.read().clone()
    }

    pub(crate) fn message_event_handlers(&self) -> Vec<Arc<dyn QueueMessageEventHandler>> {
        self.message_event_handlers.read().clone()
    }

    // ───────────────────────────────────────────────────────────
    // Events & errors
    // ───────────────────────────────────────────────────────────

    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: QueueEvent) {
        // no receiver is not an error
        let _ = self.events.send(event);
    }

    /// Logs an error caught at a queue boundary and hands it to every error handler.
    pub fn send_error(&self, hint: &str, error: &anyhow::Error, message: Option<&QueueMessage>) {
        error!(
            target: "relaymq::broker",
            hint,
            message_id = message.map(|m| m.id()),
            error = %error,
            "Queue operation failed"
        );
        for handler in self.error_handlers.read().iter() {
            handler.on_error(hint, error, message);
        }
    }

    // ───────────────────────────────────────────────────────────
    // Queue registry
    // ───────────────────────────────────────────────────────────

    /// Registers a new, not yet initialized queue.
    pub fn create_queue(
        self: &Arc<Self>,
        name: &str,
        options: Option<QueueOptions>,
    ) -> Result<Arc<Queue>, QueueError> {
        let options = options.unwrap_or_else(|| self.default_queue_options());
        match self.queues.entry(name.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(QueueError::QueueExists(name.to_owned())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let queue = Queue::new(name, options, Arc::clone(self));
                slot.insert(Arc::clone(&queue));
                info!(target: "relaymq::broker", queue = name, "Queue created");
                Ok(queue)
            }
        }
    }

    pub fn find_queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the queue named `name`, creating it with the default options if needed.
    pub fn find_or_create_queue(self: &Arc<Self>, name: &str) -> Arc<Queue> {
        self.queues
            .entry(name.to_owned())
            .or_insert_with(|| {
                debug!(target: "relaymq::broker", queue = name, "Queue not found, creating");
                Queue::new(name, self.default_queue_options(), Arc::clone(self))
            })
            .clone()
    }

    pub fn queues(&self) -> Vec<Arc<Queue>> {
        self.queues
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Destroys and unregisters the queue named `name`.
    pub async fn remove_queue(&self, name: &str) -> bool {
        match self.find_queue(name) {
            Some(queue) => {
                queue.destroy().await;
                true
            }
            None => false,
        }
    }

    /// Drops the registry entry for `queue` if it still points at it.
    pub(crate) fn unregister_queue(&self, queue: &Queue) {
        self.queues
            .remove_if(queue.name(), |_, registered| std::ptr::eq(registered.as_ref(), queue));
    }

    /// Pushes into the queue named `queue`, creating it if needed.
    pub async fn push(
        self: &Arc<Self>,
        queue: &str,
        message: Message,
        source: Option<Arc<MessagingClient>>,
    ) -> Result<PushResult, QueueError> {
        self.find_or_create_queue(queue).push(message, source).await
    }

    /// Removes a closing client from every queue it subscribed to.
    pub async fn client_disconnected(&self, client: &Arc<MessagingClient>) {
        client.disconnect();
        for name in client.subscriptions() {
            if let Some(queue) = self.find_queue(&name) {
                queue.remove_client_silent(client.id()).await;
            }
        }
        debug!(target: "relaymq::broker", client = %client.id(), "Client disconnected");
    }
}
