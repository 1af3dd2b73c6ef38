use std::sync::Arc;

use async_trait::async_trait;

use crate::core::message::QueueMessage;
use crate::core::queue::state::{begin_send, send_to_clients, QueueState};
use crate::core::queue::{PushResult, Queue};

/// Fan-out: every subscriber receives every message.
#[derive(Debug, Default)]
pub struct PushState;

#[async_trait]
impl QueueState for PushState {
    fn trigger_supported(&self) -> bool {
        true
    }

    async fn push(&self, queue: &Arc<Queue>, message: Arc<QueueMessage>) -> anyhow::Result<PushResult> {
        let Some(decision) = begin_send(queue, &message).await? else {
            return Ok(PushResult::Success);
        };

        let clients = queue.clients();
        send_to_clients(queue, &message, &clients, decision).await
    }
}
