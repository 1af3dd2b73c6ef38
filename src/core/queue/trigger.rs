use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::trace;

use crate::core::client::MessagingClient;
use crate::core::queue::state::{PullRequest, PullResult, PullStatus};
use crate::core::queue::{PushResult, Queue, QueueStatus};

impl Queue {
    /// Drains pending messages to subscribers.
    ///
    /// Single-flight: while a drain runs, further calls return immediately.
    pub fn trigger(self: &Arc<Self>) -> BoxFuture<'static, ()> {
        let queue = Arc::clone(self);
        async move { queue.process_pending_messages().await }.boxed()
    }

    /// Spawns a trigger unless one is running or the state never triggers.
    pub(crate) fn schedule_trigger(self: &Arc<Self>) {
        let supported = self.state().is_some_and(|state| state.trigger_supported());
        if supported && !self.is_triggering() && !self.is_destroyed() {
            tokio::spawn(self.trigger());
        }
    }

    async fn process_pending_messages(self: Arc<Self>) {
        if self.triggering.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained = {
            let _guard = self.queue_lock.lock().await;
            self.drain().await
        };
        self.triggering.store(false, Ordering::Release);

        // pushes that saw the flag set during the drain did not trigger
        if drained && !self.is_empty() && self.clients_count() > 0 {
            self.schedule_trigger();
        }
    }

    /// Returns true when the loop stopped because the store ran dry.
    async fn drain(self: &Arc<Self>) -> bool {
        let Some(state) = self.state() else {
            return false;
        };
        let delay = self.options().delay_between_messages();

        loop {
            if !state.trigger_supported()
                || self.is_destroyed()
                || self.status() == QueueStatus::Paused
                || self.clients_count() == 0
            {
                return false;
            }

            let Some(message) = self.consume_next() else {
                return true;
            };

            match state.push(self, Arc::clone(&message)).await {
                Ok(PushResult::NoConsumers) => {
                    trace!(target: "relaymq::queue", queue = %self.name, "No consumer took the message");
                    return false;
                }
                Ok(PushResult::Empty) => return true,
                Ok(_) => {}
                Err(error) => {
                    self.pipeline_error("PROCESS_MESSAGES", Some(&message), &error)
                        .await;
                }
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Delivers up to `request.count` pending messages to `client`.
    ///
    /// Only pull queues deliver on request; `client` must be subscribed.
    pub async fn pull(self: &Arc<Self>, client: &MessagingClient, request: PullRequest) -> PullResult {
        let Some(state) = self.state() else {
            return PullResult::status(PullStatus::Empty);
        };
        if matches!(self.status(), QueueStatus::Paused | QueueStatus::Destroyed) {
            return PullResult::status(PullStatus::StatusNotSupported);
        }
        let Some(queue_client) = self.find_client(client.id()) else {
            return PullResult::status(PullStatus::NotSubscribed);
        };

        match state.pull(self, &queue_client, request).await {
            Ok(result) => result,
            Err(error) => {
                self.pipeline_error("PULL", None, &error).await;
                PullResult::status(PullStatus::Empty)
            }
        }
    }
}
