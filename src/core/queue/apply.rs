use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::decision::{Decision, DecisionTransmission, PutBackDecision};
use crate::core::message::{Acknowledgment, ClientFrame, QueueMessage};
use crate::core::queue::info::bump;
use crate::core::queue::Queue;

/// Reason carried by producer acknowledgments for failed messages.
const FAILED_REASON: &str = "failed";

impl Queue {
    /// Executes a handler decision for `message`.
    ///
    /// `ack_override` is relayed to the producer instead of a generated
    /// acknowledgment. `force_delay` is a lower bound for a put-back delay.
    /// Returns false when the decision interrupts the normal flow. Failures
    /// are reported, never propagated.
    pub(crate) async fn apply_decision(
        self: &Arc<Self>,
        decision: Decision,
        message: &Arc<QueueMessage>,
        ack_override: Option<&Acknowledgment>,
        force_delay: Duration,
    ) -> bool {
        if let Err(error) = self
            .try_apply_decision(decision, message, ack_override, force_delay)
            .await
        {
            bump(&self.info.errors);
            self.broker.send_error("APPLY_DECISION", &error, Some(message));
        }
        !decision.interrupt
    }

    async fn try_apply_decision(
        self: &Arc<Self>,
        decision: Decision,
        message: &Arc<QueueMessage>,
        ack_override: Option<&Acknowledgment>,
        force_delay: Duration,
    ) -> anyhow::Result<()> {
        if decision.save {
            self.save_message(message).await?;
        }

        if decision.transmission != DecisionTransmission::None && !message.is_producer_ack_sent() {
            self.send_producer_ack(decision.transmission, message, ack_override);
        }

        if !decision.put_back.is_no() {
            self.apply_put_back(decision.put_back, message, force_delay);
        } else if decision.delete && !message.is_removed() {
            self.delete_message(message).await?;
        }
        Ok(())
    }

    /// Persists `message` once; later calls are no-ops.
    pub(crate) async fn save_message(&self, message: &QueueMessage) -> anyhow::Result<bool> {
        if message.is_saved() {
            return Ok(true);
        }
        let saved = self.require_manager()?.save_message(message).await?;
        if saved {
            message.set_saved(true);
            bump(&self.info.saved);
        }
        Ok(saved)
    }

    fn send_producer_ack(
        &self,
        transmission: DecisionTransmission,
        message: &QueueMessage,
        ack_override: Option<&Acknowledgment>,
    ) {
        let Some(producer) = message.source() else {
            return;
        };

        let ack = match ack_override {
            Some(ack) => ack.clone(),
            None if transmission == DecisionTransmission::Failed => {
                Acknowledgment::negative(self.name.as_str(), message.id(), FAILED_REASON)
            }
            None => Acknowledgment::positive(self.name.as_str(), message.id()),
        };

        if producer.send(ClientFrame::Acknowledgment(ack)) {
            message.set_producer_ack_sent(true);
        } else {
            debug!(
                target: "relaymq::queue",
                queue = %self.name,
                message_id = message.id(),
                producer = %producer.id(),
                "Producer is gone, acknowledgment dropped"
            );
        }
    }

    async fn delete_message(&self, message: &QueueMessage) -> anyhow::Result<()> {
        self.require_manager()?.remove_message(message).await?;
        message.mark_as_removed();
        bump(&self.info.removed);

        let cluster = self.broker.cluster();
        if cluster.is_replicating() {
            cluster.send_message_removal(&self.name, message);
        }
        Ok(())
    }

    /// Re-queues `message` into the partition chosen by `mode`. Removed
    /// messages stay removed.
    ///
    /// Without a delay the message is stored before returning; otherwise a
    /// detached task stores it once `max(force_delay, put_back_delay)` passed.
    pub(crate) fn apply_put_back(
        self: &Arc<Self>,
        mode: PutBackDecision,
        message: &Arc<QueueMessage>,
        force_delay: Duration,
    ) {
        if message.is_removed() {
            debug!(
                target: "relaymq::queue",
                queue = %self.name,
                message_id = message.id(),
                "Put back skipped, message already removed"
            );
            return;
        }
        message.set_high_priority(mode == PutBackDecision::Priority);
        bump(&self.info.put_back);

        let delay = force_delay.max(self.options().put_back_delay());
        if delay.is_zero() {
            if self.put_back_now(message) {
                self.notify_put_back(message);
            }
            return;
        }

        let queue = Arc::clone(self);
        let message = Arc::clone(message);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if queue.is_destroyed() || message.is_removed() {
                return;
            }
            queue.notify_put_back(&message);
            queue.put_back_now(&message);
        });
    }

    fn put_back_now(self: &Arc<Self>, message: &Arc<QueueMessage>) -> bool {
        if self.is_destroyed() {
            return false;
        }
        if !self.store_message(message) {
            bump(&self.info.errors);
            self.broker.send_error(
                "PUT_BACK",
                &anyhow::anyhow!("message store refused put back message '{}'", message.id()),
                Some(message),
            );
            return false;
        }
        self.schedule_trigger();
        true
    }

    fn notify_put_back(&self, message: &QueueMessage) {
        let cluster = self.broker.cluster();
        if cluster.is_replicating() {
            cluster.send_put_back(&self.name, message, !message.is_high_priority());
        }
    }

    /// Returns a message nobody received to the store without triggering.
    pub(crate) fn return_unsent(&self, message: &Arc<QueueMessage>) {
        if self.is_destroyed() {
            return;
        }
        if !self.store_message(message) {
            bump(&self.info.errors);
            self.broker.send_error(
                "RETURN_UNSENT",
                &anyhow::anyhow!("message store refused unsent message '{}'", message.id()),
                Some(message),
            );
        }
    }

    /// Reports an error escaped from a pipeline stage.
    ///
    /// A message that would otherwise be lost (neither stored, sent nor
    /// removed) is put back after the broker's error put-back delay.
    pub(crate) async fn pipeline_error(
        self: &Arc<Self>,
        hint: &str,
        message: Option<&Arc<QueueMessage>>,
        error: &anyhow::Error,
    ) {
        bump(&self.info.errors);
        self.broker
            .send_error(hint, error, message.map(|m| m.as_ref()));

        if let Some(handler) = self.delivery_handler() {
            handler.exception_thrown(hint, message, error).await;
        }

        if let Some(message) = message {
            if !message.is_in_store() && !message.is_sent() && !message.is_removed() {
                self.apply_put_back(
                    PutBackDecision::Regular,
                    message,
                    self.broker.options().error_put_back_delay(),
                );
            }
        }
    }
}
