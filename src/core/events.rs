//! Observers and the broker event bus.

use async_trait::async_trait;
use serde::Serialize;

use crate::core::client::{ClientId, MessagingClient, QueueClient};
use crate::core::delivery::MessageDelivery;
use crate::core::message::QueueMessage;
use crate::core::queue::{Queue, QueueStatus};

/// Observer of queue subscription and status changes.
#[async_trait]
pub trait QueueEventHandler: Send + Sync {
    async fn on_consumer_subscribed(&self, _queue: &Queue, _client: &QueueClient) {}

    async fn on_consumer_unsubscribed(&self, _queue: &Queue, _client: &QueueClient) {}

    /// Called before a status change is applied. Returning false vetoes it.
    async fn on_status_changed(&self, _queue: &Queue, _from: QueueStatus, _to: QueueStatus) -> bool {
        true
    }
}

/// Observer of produced and acknowledged messages. Called off the hot path.
#[async_trait]
pub trait QueueMessageEventHandler: Send + Sync {
    async fn on_produced(
        &self,
        _queue: &Queue,
        _message: &QueueMessage,
        _source: Option<&MessagingClient>,
    ) {
    }

    async fn on_acknowledged(
        &self,
        _queue: &Queue,
        _message: &QueueMessage,
        _delivery: &MessageDelivery,
        _success: bool,
    ) {
    }
}

/// Sink for errors caught at queue boundaries.
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, hint: &str, error: &anyhow::Error, message: Option<&QueueMessage>);
}

/// Events published on the broker bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    Pushed {
        queue: String,
        message_id: String,
    },
    Acknowledged {
        queue: String,
        message_id: String,
        client: String,
    },
    NegativeAcknowledged {
        queue: String,
        message_id: String,
        client: String,
    },
    AcknowledgeTimedOut {
        queue: String,
        message_id: String,
        client: String,
    },
    MessageTimedOut {
        queue: String,
        message_id: String,
    },
    StatusChanged {
        queue: String,
        from: QueueStatus,
        to: QueueStatus,
    },
    Subscribed {
        queue: String,
        client: String,
    },
    Unsubscribed {
        queue: String,
        client: String,
    },
    Destroyed {
        queue: String,
    },
}

impl QueueEvent {
    pub fn queue(&self) -> &str {
        match self {
            QueueEvent::Pushed { queue, .. }
            | QueueEvent::Acknowledged { queue, .. }
            | QueueEvent::NegativeAcknowledged { queue, .. }
            | QueueEvent::AcknowledgeTimedOut { queue, .. }
            | QueueEvent::MessageTimedOut { queue, .. }
            | QueueEvent::StatusChanged { queue, .. }
            | QueueEvent::Subscribed { queue, .. }
            | QueueEvent::Unsubscribed { queue, .. }
            | QueueEvent::Destroyed { queue } => queue,
        }
    }

    pub(crate) fn subscribed(queue: &str, client: &ClientId) -> Self {
        QueueEvent::Subscribed {
            queue: queue.to_owned(),
            client: client.to_string(),
        }
    }

    pub(crate) fn unsubscribed(queue: &str, client: &ClientId) -> Self {
        QueueEvent::Unsubscribed {
            queue: queue.to_owned(),
            client: client.to_string(),
        }
    }
}
