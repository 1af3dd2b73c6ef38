use std::sync::Arc;

use tracing::{debug, info};

use crate::core::client::{ClientId, MessagingClient, QueueClient};
use crate::core::events::QueueEvent;
use crate::core::queue::{Queue, SubscriptionResult};

impl Queue {
    /// Subscribes `client` to the queue.
    ///
    /// Subscribing twice is a no-op that reports `Success`.
    pub async fn add_client(self: &Arc<Self>, client: Arc<MessagingClient>) -> SubscriptionResult {
        if self.is_destroyed() {
            return SubscriptionResult::Destroyed;
        }

        for authenticator in self.broker.authenticators() {
            if !authenticator.authenticate(self, &client).await {
                debug!(
                    target: "relaymq::queue",
                    queue = %self.name,
                    client = %client.id(),
                    "Subscription rejected by authenticator"
                );
                return SubscriptionResult::Unauthorized;
            }
        }

        let client_limit = self.options.read().client_limit;
        let queue_client = {
            let mut clients = self.clients.write();
            if clients.iter().any(|c| c.id() == client.id()) {
                return SubscriptionResult::Success;
            }
            if client_limit > 0 && clients.len() >= client_limit {
                return SubscriptionResult::Full;
            }
            let queue_client = Arc::new(QueueClient::new(Arc::clone(&client)));
            clients.push(Arc::clone(&queue_client));
            queue_client
        };

        client.add_subscription(&self.name);
        for handler in self.broker.queue_event_handlers() {
            handler.on_consumer_subscribed(self, &queue_client).await;
        }
        self.broker
            .publish(QueueEvent::subscribed(&self.name, client.id()));
        info!(
            target: "relaymq::queue",
            queue = %self.name,
            client = %client.id(),
            "Client subscribed"
        );

        self.schedule_trigger();
        SubscriptionResult::Success
    }

    /// Unsubscribes the client with `id`. Returns false if it was not subscribed.
    pub async fn remove_client(&self, id: &ClientId) -> bool {
        self.detach(|c| c.id() == id, false).await > 0
    }

    /// Unsubscribes every client matching `predicate`, returning how many left.
    pub async fn remove_client_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&QueueClient) -> bool + Send,
    {
        self.detach(predicate, false).await
    }

    /// Unsubscribes without touching the client's own subscription list.
    ///
    /// Used when the connection is closing and its state is discarded anyway.
    pub async fn remove_client_silent(&self, id: &ClientId) -> bool {
        self.detach(|c| c.id() == id, true).await > 0
    }

    async fn detach<F>(&self, predicate: F, silent: bool) -> usize
    where
        F: Fn(&QueueClient) -> bool + Send,
    {
        let removed: Vec<Arc<QueueClient>> = {
            let mut clients = self.clients.write();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *clients)
                .into_iter()
                .partition(|c| predicate(c));
            *clients = kept;
            removed
        };

        for client in &removed {
            if !silent {
                client.client().remove_subscription(&self.name);
            }
            for handler in self.broker.queue_event_handlers() {
                handler.on_consumer_unsubscribed(self, client).await;
            }
            self.broker
                .publish(QueueEvent::unsubscribed(&self.name, client.id()));
            info!(
                target: "relaymq::queue",
                queue = %self.name,
                client = %client.id(),
                "Client unsubscribed"
            );
        }
        removed.len()
    }
}
