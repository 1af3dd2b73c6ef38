use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::client::QueueClient;
use crate::core::message::QueueMessage;
use crate::core::queue::options::QueueAckDecision;
use crate::core::queue::state::{begin_send, send_to_clients, QueueState};
use crate::core::queue::{PushResult, Queue};

/// One subscriber per message, rotating over the subscription list.
#[derive(Debug, Default)]
pub struct RoundRobinState {
    cursor: AtomicUsize,
}

impl RoundRobinState {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next connected client, skipping busy ones when `skip_processing` is set.
    fn next_client(&self, clients: &[Arc<QueueClient>], skip_processing: bool) -> Option<Arc<QueueClient>> {
        if clients.is_empty() {
            return None;
        }

        let start = self.cursor.load(Ordering::Relaxed);
        for offset in 0..clients.len() {
            let index = (start + offset) % clients.len();
            let client = &clients[index];
            if client.client().is_connected() && !(skip_processing && client.is_processing()) {
                self.cursor.store(index + 1, Ordering::Relaxed);
                return Some(Arc::clone(client));
            }
        }
        None
    }
}

#[async_trait]
impl QueueState for RoundRobinState {
    fn trigger_supported(&self) -> bool {
        true
    }

    async fn push(&self, queue: &Arc<Queue>, message: Arc<QueueMessage>) -> anyhow::Result<PushResult> {
        let Some(decision) = begin_send(queue, &message).await? else {
            return Ok(PushResult::Success);
        };

        let skip_processing = queue.options().acknowledge == QueueAckDecision::WaitForAcknowledge;
        let Some(client) = self.next_client(&queue.clients(), skip_processing) else {
            queue.return_unsent(&message);
            queue.release_acknowledge_lock(false);
            return Ok(PushResult::NoConsumers);
        };

        send_to_clients(queue, &message, &[client], decision).await
    }
}
