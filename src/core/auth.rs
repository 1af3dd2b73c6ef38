//! Subscription authorization.
//!
//! Authentication policies are owned by the embedding server; queues only ask
//! every registered [`QueueAuthenticator`] before accepting a consumer.

use async_trait::async_trait;
use dashmap::DashSet;
use tracing::debug;

use crate::core::client::{ClientId, MessagingClient};
use crate::core::queue::Queue;

#[async_trait]
pub trait QueueAuthenticator: Send + Sync {
    /// Returns true if `client` may subscribe to `queue`.
    async fn authenticate(&self, queue: &Queue, client: &MessagingClient) -> bool;
}

/// Accepts only the listed client ids.
#[derive(Debug, Default)]
pub struct AllowListAuthenticator {
    allowed: DashSet<ClientId>,
}

impl AllowListAuthenticator {
    pub fn new<I, C>(clients: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ClientId>,
    {
        Self {
            allowed: clients.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allow(&self, client: impl Into<ClientId>) {
        self.allowed.insert(client.into());
    }

    pub fn revoke(&self, client: &ClientId) {
        self.allowed.remove(client);
    }
}

#[async_trait]
impl QueueAuthenticator for AllowListAuthenticator {
    async fn authenticate(&self, queue: &Queue, client: &MessagingClient) -> bool {
        let allowed = self.allowed.contains(client.id());
        if !allowed {
            debug!(
                target: "relaymq::auth",
                queue = queue.name(),
                client = %client.id(),
                "Client is not on the allow list"
            );
        }
        allowed
    }
}
