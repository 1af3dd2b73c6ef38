use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::client::MessagingClient;
use crate::core::cluster::{ClusterMode, ClusterNotifier, NodeState};
use crate::core::error::QueueError;
use crate::core::events::QueueEvent;
use crate::core::message::{generate_id, headers, Message, QueueMessage};
use crate::core::queue::info::bump;
use crate::core::queue::options::{LimitExceededStrategy, QueueOptions};
use crate::core::queue::{PushResult, Queue, QueueStatus};

impl Queue {
    /// Pushes a produced message into the queue.
    ///
    /// Policy rejections are reported through [`PushResult`]; `Err` only
    /// means the queue could not be initialized.
    pub async fn push(
        self: &Arc<Self>,
        message: Message,
        source: Option<Arc<MessagingClient>>,
    ) -> Result<PushResult, QueueError> {
        self.ensure_initialized(&message.headers).await?;

        if matches!(
            self.status(),
            QueueStatus::Paused | QueueStatus::OnlyConsume | QueueStatus::Destroyed
        ) {
            return Ok(PushResult::StatusNotSupported);
        }

        let options = self.options();
        if options.message_size_limit > 0 && message.payload.len() > options.message_size_limit {
            debug!(
                target: "relaymq::queue",
                queue = %self.name,
                size = message.payload.len(),
                limit = options.message_size_limit,
                "Message rejected: size limit exceeded"
            );
            return Ok(PushResult::LimitExceeded);
        }
        if options.message_limit > 0 && self.message_count() >= options.message_limit {
            let room_made = options.limit_exceeded_strategy == LimitExceededStrategy::DeleteOldestMessage
                && self.delete_oldest();
            if !room_made {
                debug!(
                    target: "relaymq::queue",
                    queue = %self.name,
                    limit = options.message_limit,
                    "Message rejected: message limit exceeded"
                );
                return Ok(PushResult::LimitExceeded);
            }
        }

        let cluster = self.broker.cluster();
        if cluster.mode() == ClusterMode::Reliable && cluster.state() != NodeState::Main {
            return Ok(PushResult::StatusNotSupported);
        }

        let message = self.create_message(message, source, &options);
        match self.push_message(&message, cluster.as_ref()).await {
            Ok(result) => Ok(result),
            Err(error) => {
                self.pipeline_error("PUSH", Some(&message), &error).await;
                Ok(PushResult::Error)
            }
        }
    }

    /// Stores a message replicated from another node.
    ///
    /// The delivery handler decides on the message as on a produced one.
    /// Limits, replication and producer notification are skipped and no
    /// trigger is scheduled.
    pub async fn push_by_node(self: &Arc<Self>, message: Message) -> Result<PushResult, QueueError> {
        self.ensure_initialized(&message.headers).await?;

        let options = self.options();
        let message = self.create_message(message, None, &options);
        self.wait_while_syncing().await;

        bump(&self.info.received);
        if let Err(error) = self.push_replicated(&message).await {
            self.pipeline_error("PUSH_BY_NODE", Some(&message), &error).await;
        }
        Ok(PushResult::Success)
    }

    async fn push_replicated(self: &Arc<Self>, message: &Arc<QueueMessage>) -> anyhow::Result<()> {
        let handler = Arc::clone(self.require_manager()?.delivery_handler());
        let decision = handler.received_from_producer(self, message, None).await?;
        message.set_decision(decision);

        if !self.apply_decision(decision, message, None, Duration::ZERO).await {
            return Ok(());
        }
        if decision.put_back.is_no() && !message.is_removed() && !self.store_message(message) {
            anyhow::bail!("message store refused replicated message '{}'", message.id());
        }
        Ok(())
    }

    fn create_message(
        &self,
        mut message: Message,
        source: Option<Arc<MessagingClient>>,
        options: &QueueOptions,
    ) -> Arc<QueueMessage> {
        message.headers.remove_all(headers::OPERATIONAL);
        let id = message
            .id
            .take()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_id);
        let deadline = options.message_timeout().map(|timeout| Instant::now() + timeout);
        Arc::new(QueueMessage::new(id, message, source, deadline))
    }

    async fn push_message(
        self: &Arc<Self>,
        message: &Arc<QueueMessage>,
        cluster: &dyn ClusterNotifier,
    ) -> anyhow::Result<PushResult> {
        if cluster.is_replicating() {
            let _guard = self.queue_lock.lock().await;
            if !cluster.send_queue_message(&self.name, message).await {
                warn!(
                    target: "relaymq::queue",
                    queue = %self.name,
                    message_id = message.id(),
                    "Replicas did not accept message"
                );
                return Ok(PushResult::Error);
            }
        }

        bump(&self.info.received);

        let handler = Arc::clone(self.require_manager()?.delivery_handler());
        let decision = handler
            .received_from_producer(self, message, message.source())
            .await?;
        message.set_decision(decision);

        if !self.apply_decision(decision, message, None, Duration::ZERO).await {
            return Ok(PushResult::StatusNotSupported);
        }

        // a put back or a delete already decided where the message lives
        if decision.put_back.is_no() && !message.is_removed() {
            self.wait_while_syncing().await;
            if !self.store_message(message) {
                anyhow::bail!("message store refused message '{}'", message.id());
            }
            self.schedule_trigger();
        }

        self.notify_produced(message);
        self.broker.publish(QueueEvent::Pushed {
            queue: self.name.clone(),
            message_id: message.id().to_owned(),
        });
        Ok(PushResult::Success)
    }

    /// Blocks while another task holds the FIFO lock for syncing.
    async fn wait_while_syncing(&self) {
        if self.status() == QueueStatus::Syncing {
            drop(self.queue_lock.lock().await);
        }
    }

    /// Removes the oldest pending message to make room for a new one.
    fn delete_oldest(&self) -> bool {
        let Some(manager) = self.manager.get() else {
            return false;
        };
        let Some(oldest) = manager
            .message_store()
            .consume_first()
            .or_else(|| manager.priority_message_store().consume_first())
        else {
            return false;
        };

        oldest.mark_as_removed();
        bump(&self.info.removed);
        let cluster = self.broker.cluster();
        if cluster.is_replicating() {
            cluster.send_message_removal(&self.name, &oldest);
        }
        debug!(
            target: "relaymq::queue",
            queue = %self.name,
            message_id = oldest.id(),
            "Oldest message dropped to respect the message limit"
        );
        true
    }

    fn notify_produced(self: &Arc<Self>, message: &Arc<QueueMessage>) {
        let handlers = self.broker.message_event_handlers();
        if handlers.is_empty() {
            return;
        }

        let queue = Arc::clone(self);
        let message = Arc::clone(message);
        tokio::spawn(async move {
            for handler in handlers {
                handler
                    .on_produced(&queue, &message, message.source().map(|s| s.as_ref()))
                    .await;
            }
        });
    }
}
