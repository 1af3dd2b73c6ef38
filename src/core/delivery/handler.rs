//! Pluggable delivery policy.
//!
//! The queue calls a [`DeliveryHandler`] at fixed extension points and applies
//! the [`Decision`]s it returns. Only the producer and acknowledgment hooks
//! are mandatory; the send-path and timeout hooks default to neutral verdicts.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::core::client::{MessagingClient, QueueClient};
use crate::core::decision::{Decision, DecisionTransmission, PutBackDecision};
use crate::core::delivery::{DeliveryTracker, MessageDelivery};
use crate::core::message::{Acknowledgment, QueueMessage};
use crate::core::queue::options::{CommitWhen, QueueOptions};
use crate::core::queue::Queue;

#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Outstanding deliveries of the queue this handler serves.
    fn tracker(&self) -> &DeliveryTracker;

    /// A producer pushed `message`.
    async fn received_from_producer(
        &self,
        queue: &Queue,
        message: &Arc<QueueMessage>,
        source: Option<&Arc<MessagingClient>>,
    ) -> anyhow::Result<Decision>;

    /// A consumer answered a delivery. `success` is false for negative acknowledgments.
    async fn acknowledge_received(
        &self,
        queue: &Queue,
        ack: &Acknowledgment,
        delivery: &MessageDelivery,
        success: bool,
    ) -> anyhow::Result<Decision>;

    /// Called before the queue state starts distributing `message`.
    async fn begin_send(&self, _queue: &Queue, _message: &Arc<QueueMessage>) -> anyhow::Result<Decision> {
        Ok(Decision::allow())
    }

    async fn can_consumer_receive(
        &self,
        _queue: &Queue,
        _message: &Arc<QueueMessage>,
        _client: &QueueClient,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn consumer_received(&self, _queue: &Queue, _delivery: &MessageDelivery) -> anyhow::Result<Decision> {
        Ok(Decision::allow())
    }

    async fn consumer_receive_failed(
        &self,
        _queue: &Queue,
        _delivery: &MessageDelivery,
    ) -> anyhow::Result<Decision> {
        Ok(Decision::allow())
    }

    /// Called once distribution of `message` is over.
    async fn end_send(&self, _queue: &Queue, _message: &Arc<QueueMessage>) -> anyhow::Result<Decision> {
        Ok(Decision::allow())
    }

    /// `message` stayed in the store past its deadline.
    async fn message_timed_out(&self, _queue: &Queue, _message: &Arc<QueueMessage>) -> anyhow::Result<Decision> {
        Ok(Decision::delete_message())
    }

    /// No acknowledgment arrived for `delivery` before its deadline.
    async fn acknowledge_timed_out(
        &self,
        _queue: &Queue,
        _delivery: &MessageDelivery,
    ) -> anyhow::Result<Decision> {
        Ok(Decision::allow())
    }

    /// An error escaped a pipeline stage. `hint` names the stage.
    async fn exception_thrown(&self, _hint: &str, _message: Option<&Arc<QueueMessage>>, _error: &anyhow::Error) {}
}

/// Handler whose verdicts follow the queue options.
///
/// - producer acknowledgment per [`CommitWhen`]
/// - messages without acknowledgment are deleted once sent
/// - positive acknowledgments delete, negative ones and timeouts put back
///   per `put_back` (delete when it is `No`)
#[derive(Debug, Default)]
pub struct DefaultDeliveryHandler {
    tracker: DeliveryTracker,
}

impl DefaultDeliveryHandler {
    pub fn new() -> Self {
        Self {
            tracker: DeliveryTracker::new(),
        }
    }

    fn commit_on(options: &QueueOptions, stage: CommitWhen, transmission: DecisionTransmission) -> Decision {
        if options.commit_when == stage {
            Decision::transmit(transmission)
        } else {
            Decision::allow()
        }
    }

    fn put_back_or_delete(options: &QueueOptions) -> Decision {
        match options.put_back {
            PutBackDecision::No => Decision::delete_message(),
            PutBackDecision::Regular => Decision::put_back_message(false),
            PutBackDecision::Priority => Decision::put_back_message(true),
        }
    }
}

#[async_trait]
impl DeliveryHandler for DefaultDeliveryHandler {
    fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    async fn received_from_producer(
        &self,
        queue: &Queue,
        _message: &Arc<QueueMessage>,
        _source: Option<&Arc<MessagingClient>>,
    ) -> anyhow::Result<Decision> {
        let options = queue.options();
        Ok(Self::commit_on(
            &options,
            CommitWhen::AfterReceived,
            DecisionTransmission::Success,
        ))
    }

    async fn acknowledge_received(
        &self,
        queue: &Queue,
        _ack: &Acknowledgment,
        _delivery: &MessageDelivery,
        success: bool,
    ) -> anyhow::Result<Decision> {
        let options = queue.options();
        if success {
            Ok(Decision::delete_message().combine(Self::commit_on(
                &options,
                CommitWhen::AfterAcknowledge,
                DecisionTransmission::Success,
            )))
        } else {
            Ok(Self::put_back_or_delete(&options).combine(Self::commit_on(
                &options,
                CommitWhen::AfterAcknowledge,
                DecisionTransmission::Failed,
            )))
        }
    }

    async fn consumer_received(&self, queue: &Queue, _delivery: &MessageDelivery) -> anyhow::Result<Decision> {
        let options = queue.options();
        Ok(Self::commit_on(
            &options,
            CommitWhen::AfterSent,
            DecisionTransmission::Success,
        ))
    }

    async fn end_send(&self, queue: &Queue, message: &Arc<QueueMessage>) -> anyhow::Result<Decision> {
        let options = queue.options();
        if !options.acknowledge.is_required() && message.is_sent() {
            return Ok(Decision::delete_message());
        }
        Ok(Decision::allow())
    }

    async fn acknowledge_timed_out(
        &self,
        queue: &Queue,
        _delivery: &MessageDelivery,
    ) -> anyhow::Result<Decision> {
        let options = queue.options();
        Ok(Self::put_back_or_delete(&options).combine(Self::commit_on(
            &options,
            CommitWhen::AfterAcknowledge,
            DecisionTransmission::Failed,
        )))
    }

    async fn exception_thrown(&self, hint: &str, message: Option<&Arc<QueueMessage>>, error: &anyhow::Error) {
        warn!(
            target: "relaymq::delivery",
            hint,
            message_id = message.map(|m| m.id()),
            error = %error,
            "Delivery pipeline raised an error"
        );
    }
}
