use std::sync::Arc;

use async_trait::async_trait;

use crate::core::client::QueueClient;
use crate::core::message::QueueMessage;
use crate::core::queue::state::{begin_send, send_to_clients, PullRequest, PullResult, PullStatus, QueueState};
use crate::core::queue::{PushResult, Queue};

/// Messages stay in the store until a consumer asks for them.
#[derive(Debug, Default)]
pub struct PullState;

impl PullState {
    async fn deliver(
        queue: &Arc<Queue>,
        client: &Arc<QueueClient>,
        message: &Arc<QueueMessage>,
    ) -> anyhow::Result<PushResult> {
        let Some(decision) = begin_send(queue, message).await? else {
            return Ok(PushResult::Success);
        };
        send_to_clients(queue, message, std::slice::from_ref(client), decision).await
    }
}

#[async_trait]
impl QueueState for PullState {
    fn trigger_supported(&self) -> bool {
        false
    }

    async fn push(&self, _queue: &Arc<Queue>, _message: Arc<QueueMessage>) -> anyhow::Result<PushResult> {
        Ok(PushResult::Success)
    }

    async fn pull(
        &self,
        queue: &Arc<Queue>,
        client: &Arc<QueueClient>,
        request: PullRequest,
    ) -> anyhow::Result<PullResult> {
        let mut delivered = 0;

        while delivered < request.count {
            let Some(message) = queue.consume_next() else {
                break;
            };

            match Self::deliver(queue, client, &message).await {
                Ok(PushResult::Success) if message.is_sent() => delivered += 1,
                Ok(_) => break,
                Err(error) => {
                    queue.pipeline_error("PULL", Some(&message), &error).await;
                    break;
                }
            }
        }

        let status = if delivered == 0 {
            PullStatus::Empty
        } else {
            PullStatus::Success
        };
        Ok(PullResult { status, delivered })
    }
}
