//! Deadline resolution for deliveries and stored messages.
//!
//! Driven by each queue's maintenance task every `time_keeper_interval`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::events::QueueEvent;
use crate::core::queue::info::bump;
use crate::core::queue::Queue;

/// Resolves every delivery and message of `queue` whose deadline passed.
pub async fn run(queue: &Arc<Queue>) {
    if queue.is_destroyed() || !queue.is_initialized() {
        return;
    }

    let now = Instant::now();
    resolve_deliveries(queue, now).await;
    resolve_messages(queue, now).await;
}

async fn resolve_deliveries(queue: &Arc<Queue>, now: Instant) {
    let Some(handler) = queue.delivery_handler() else {
        return;
    };

    for delivery in handler.tracker().take_expired(now) {
        delivery.mark_as_timed_out();
        let message = Arc::clone(delivery.message());
        let client = delivery.receiver().map(|receiver| {
            receiver.clear_processing_if(&message);
            receiver.id().to_string()
        });
        bump(&queue.info.unacknowledged);

        debug!(
            target: "relaymq::delivery",
            queue = queue.name(),
            message_id = message.id(),
            client = client.as_deref().unwrap_or_default(),
            "Acknowledgment timed out"
        );

        match handler.acknowledge_timed_out(queue, &delivery).await {
            Ok(decision) => {
                message.set_decision(decision);
                queue
                    .apply_decision(decision, &message, None, Duration::ZERO)
                    .await;
            }
            Err(error) => {
                queue
                    .pipeline_error("ACKNOWLEDGE_TIMEOUT", Some(&message), &error)
                    .await;
            }
        }

        queue.release_acknowledge_lock(false);
        queue.broker().publish(QueueEvent::AcknowledgeTimedOut {
            queue: queue.name().to_owned(),
            message_id: message.id().to_owned(),
            client: client.unwrap_or_default(),
        });
    }
}

async fn resolve_messages(queue: &Arc<Queue>, now: Instant) {
    let (Some(manager), Some(handler)) = (queue.manager().cloned(), queue.delivery_handler()) else {
        return;
    };

    let mut expired = manager.priority_message_store().drain_expired(now);
    expired.extend(manager.message_store().drain_expired(now));

    for message in expired {
        message.set_in_store(false);
        bump(&queue.info.timed_out_messages);

        match handler.message_timed_out(queue, &message).await {
            Ok(decision) => {
                message.set_decision(decision);
                queue
                    .apply_decision(decision, &message, None, Duration::ZERO)
                    .await;
            }
            Err(error) => {
                queue
                    .pipeline_error("MESSAGE_TIMEOUT", Some(&message), &error)
                    .await;
            }
        }

        queue.broker().publish(QueueEvent::MessageTimedOut {
            queue: queue.name().to_owned(),
            message_id: message.id().to_owned(),
        });
    }
}
