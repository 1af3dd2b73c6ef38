use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::core::client::MessagingClient;
use crate::core::delivery::{DeliveryAcknowledge, MessageDelivery};
use crate::core::events::QueueEvent;
use crate::core::message::Acknowledgment;
use crate::core::queue::info::bump;
use crate::core::queue::Queue;

/// Delays before looking a delivery up again; an acknowledgment may race
/// ahead of the delivery being tracked.
const ACK_LOOKUP_RETRIES: [Duration; 2] = [Duration::from_millis(1), Duration::from_millis(3)];

impl Queue {
    /// Waits until the previous delivery is acknowledged (or its wait times
    /// out), then installs a fresh signal for the next one.
    pub async fn wait_for_acknowledge(&self) {
        let timeout = self.options().acknowledge_timeout();
        let mut pending = self.ack_lock.lock().await;

        if let Some(previous) = pending.take() {
            if tokio::time::timeout(timeout, previous).await.is_err() {
                debug!(
                    target: "relaymq::queue",
                    queue = %self.name,
                    "Acknowledgment wait elapsed, sending next message"
                );
            }
        }

        if self.is_destroyed() {
            return;
        }

        let (signal, receiver) = oneshot::channel();
        *self.ack_signal.lock() = Some(signal);
        *pending = Some(receiver);
    }

    /// Fires and clears the pending acknowledgment signal.
    pub fn release_acknowledge_lock(&self, received: bool) {
        if let Some(signal) = self.ack_signal.lock().take() {
            let _ = signal.send(received);
        }
    }

    /// Resolves the delivery acknowledged by `from`.
    ///
    /// Unknown or already timed-out deliveries are ignored.
    pub async fn acknowledge_delivered(self: &Arc<Self>, from: &MessagingClient, ack: Acknowledgment) {
        let Some(handler) = self.delivery_handler() else {
            return;
        };

        let mut delivery = handler
            .tracker()
            .find_and_remove_delivery(from.id(), &ack.message_id);
        for delay in ACK_LOOKUP_RETRIES {
            if delivery.is_some() {
                break;
            }
            tokio::time::sleep(delay).await;
            delivery = handler
                .tracker()
                .find_and_remove_delivery(from.id(), &ack.message_id);
        }

        let Some(delivery) = delivery else {
            trace!(
                target: "relaymq::queue",
                queue = %self.name,
                client = %from.id(),
                message_id = %ack.message_id,
                "Acknowledgment for unknown delivery ignored"
            );
            return;
        };
        if delivery.acknowledge() == DeliveryAcknowledge::Timeout {
            return;
        }

        let success = ack.is_positive();
        let message = Arc::clone(delivery.message());
        if let Some(receiver) = delivery.receiver() {
            receiver.clear_processing_if(&message);
        }
        delivery.mark_as_acknowledged(success);
        bump(if success {
            &self.info.acknowledged
        } else {
            &self.info.negative_acknowledged
        });

        match handler.acknowledge_received(self, &ack, &delivery, success).await {
            Ok(decision) => {
                message.set_decision(decision);
                self.apply_decision(decision, &message, Some(&ack), Duration::ZERO)
                    .await;
            }
            Err(error) => {
                self.pipeline_error("ACKNOWLEDGE_DELIVERED", None, &error).await;
            }
        }

        self.notify_acknowledged(Arc::clone(&delivery), success);
        self.release_acknowledge_lock(success);

        let client = from.id().to_string();
        let message_id = message.id().to_owned();
        self.broker.publish(if success {
            QueueEvent::Acknowledged {
                queue: self.name.clone(),
                message_id,
                client,
            }
        } else {
            QueueEvent::NegativeAcknowledged {
                queue: self.name.clone(),
                message_id,
                client,
            }
        });
    }

    fn notify_acknowledged(self: &Arc<Self>, delivery: Arc<MessageDelivery>, success: bool) {
        let handlers = self.broker.message_event_handlers();
        if handlers.is_empty() {
            return;
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            for handler in handlers {
                handler
                    .on_acknowledged(&queue, delivery.message(), &delivery, success)
                    .await;
            }
        });
    }
}
