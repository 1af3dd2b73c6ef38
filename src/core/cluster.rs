//! Replication hooks consumed by queues.
//!
//! The replication protocol itself lives outside the engine. Queues only call
//! a [`ClusterNotifier`] at the points where a peer must learn about a change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::message::QueueMessage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    /// Nodes share load; pushes are not replicated before they are accepted.
    #[default]
    Scaled,
    /// Every push must be acknowledged by the replicas before it is stored.
    Reliable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Main,
    Replica,
    /// Replica elected to take over when the main node goes away.
    Successor,
}

#[async_trait]
pub trait ClusterNotifier: Send + Sync {
    fn mode(&self) -> ClusterMode;

    fn state(&self) -> NodeState;

    /// True when queue changes must be replicated by this node.
    fn is_replicating(&self) -> bool {
        self.mode() == ClusterMode::Reliable && self.state() == NodeState::Main
    }

    /// Replicates a produced message. Returns true once the replicas accepted it.
    async fn send_queue_message(&self, queue: &str, message: &QueueMessage) -> bool;

    fn send_put_back(&self, queue: &str, message: &QueueMessage, regular: bool);

    fn send_message_removal(&self, queue: &str, message: &QueueMessage);

    fn send_queue_removed(&self, queue: &str);
}

/// Notifier for a node running without peers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneCluster;

#[async_trait]
impl ClusterNotifier for StandaloneCluster {
    fn mode(&self) -> ClusterMode {
        ClusterMode::Scaled
    }

    fn state(&self) -> NodeState {
        NodeState::Main
    }

    async fn send_queue_message(&self, _queue: &str, _message: &QueueMessage) -> bool {
        true
    }

    fn send_put_back(&self, _queue: &str, _message: &QueueMessage, _regular: bool) {}

    fn send_message_removal(&self, _queue: &str, _message: &QueueMessage) {}

    fn send_queue_removed(&self, _queue: &str) {}
}
