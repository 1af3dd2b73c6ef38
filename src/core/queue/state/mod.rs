//! Delivery strategies.
//!
//! A [`QueueState`] is bound once, at initialization, from the queue type.
//! All strategies share the same send path: acknowledgment wait, handler
//! hooks, delivery tracking, and a single decision applied per message.

mod pull;
mod push;
mod round_robin;

pub use pull::PullState;
pub use push::PushState;
pub use round_robin::RoundRobinState;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::core::client::QueueClient;
use crate::core::decision::Decision;
use crate::core::delivery::MessageDelivery;
use crate::core::message::{ClientFrame, DeliveredMessage, QueueMessage};
use crate::core::queue::info::bump;
use crate::core::queue::options::{QueueAckDecision, QueueType};
use crate::core::queue::{PushResult, Queue};

/// Consumer request for messages from a pull queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullRequest {
    /// Maximum number of messages to deliver.
    pub count: usize,
}

impl PullRequest {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullStatus {
    Success,
    /// Nothing was pending.
    Empty,
    /// The client is not subscribed to the queue.
    NotSubscribed,
    StatusNotSupported,
    /// The queue does not deliver on request.
    NotSupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PullResult {
    pub status: PullStatus,
    pub delivered: usize,
}

impl PullResult {
    pub fn status(status: PullStatus) -> Self {
        Self {
            status,
            delivered: 0,
        }
    }
}

#[async_trait]
pub trait QueueState: Send + Sync {
    /// False for strategies that never drain the store in the background.
    fn trigger_supported(&self) -> bool;

    /// Distributes `message`, already taken out of the store.
    async fn push(&self, queue: &Arc<Queue>, message: Arc<QueueMessage>) -> anyhow::Result<PushResult>;

    async fn pull(
        &self,
        _queue: &Arc<Queue>,
        _client: &Arc<QueueClient>,
        _request: PullRequest,
    ) -> anyhow::Result<PullResult> {
        Ok(PullResult::status(PullStatus::NotSupported))
    }
}

pub(crate) fn create(queue_type: QueueType) -> Box<dyn QueueState> {
    match queue_type {
        QueueType::Push => Box::new(PushState),
        QueueType::RoundRobin => Box::new(RoundRobinState::new()),
        QueueType::Pull => Box::new(PullState),
    }
}

/// Waits for the previous acknowledgment if required, then asks the handler
/// whether sending may start. Returns `None` when the handler interrupted.
pub(crate) async fn begin_send(
    queue: &Arc<Queue>,
    message: &Arc<QueueMessage>,
) -> anyhow::Result<Option<Decision>> {
    let handler = queue.require_manager()?.delivery_handler().clone();

    if queue.options().acknowledge == QueueAckDecision::WaitForAcknowledge {
        queue.wait_for_acknowledge().await;
    }

    let decision = handler.begin_send(queue, message).await?;
    if decision.interrupt {
        message.set_decision(decision);
        queue.apply_decision(decision, message, None, Duration::ZERO).await;
        queue.release_acknowledge_lock(false);
        return Ok(None);
    }
    Ok(Some(decision))
}

/// Sends `message` to `clients` and applies the merged decision once.
///
/// A message nobody received goes back to the store and `NoConsumers` is
/// returned.
pub(crate) async fn send_to_clients(
    queue: &Arc<Queue>,
    message: &Arc<QueueMessage>,
    clients: &[Arc<QueueClient>],
    mut decision: Decision,
) -> anyhow::Result<PushResult> {
    let handler = queue.require_manager()?.delivery_handler().clone();
    let options = queue.options();
    let ack_required = options.acknowledge.is_required();
    let mut received = false;

    for client in clients {
        if !client.client().is_connected() {
            continue;
        }
        if !handler.can_consumer_receive(queue, message, client).await? {
            continue;
        }

        let deadline = ack_required.then(|| Instant::now() + options.acknowledge_timeout());
        let delivery = Arc::new(MessageDelivery::new(
            Arc::clone(message),
            Some(Arc::clone(client)),
            deadline,
        ));
        if ack_required {
            handler.tracker().track(Arc::clone(&delivery));
        }

        let frame = ClientFrame::Message(DeliveredMessage::from_queue_message(
            queue.name(),
            message,
            ack_required,
        ));

        if client.client().send(frame) {
            delivery.mark_as_sent();
            message.mark_sent();
            bump(&queue.info.sent);
            if ack_required {
                client.set_processing(Arc::clone(message));
            }
            received = true;
            decision = decision.combine(handler.consumer_received(queue, &delivery).await?);
        } else {
            if ack_required {
                handler.tracker().remove_delivery(&delivery);
            }
            decision = decision.combine(handler.consumer_receive_failed(queue, &delivery).await?);
        }
    }

    if !received {
        queue.return_unsent(message);
        queue.release_acknowledge_lock(false);
        return Ok(PushResult::NoConsumers);
    }

    decision = decision.combine(handler.end_send(queue, message).await?);
    message.set_decision(decision);
    queue.apply_decision(decision, message, None, Duration::ZERO).await;
    Ok(PushResult::Success)
}
