use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::core::client::ClientId;
use crate::core::delivery::MessageDelivery;

type DeliveryKey = (ClientId, String);

/// Outstanding deliveries keyed by receiving client and message id.
///
/// Used to correlate inbound acknowledgments and to find deliveries whose
/// acknowledgment deadline has passed.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    deliveries: DashMap<DeliveryKey, Arc<MessageDelivery>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self {
            deliveries: DashMap::new(),
        }
    }

    /// Starts following a delivery. Deliveries without a receiver are ignored.
    pub fn track(&self, delivery: Arc<MessageDelivery>) {
        let Some(receiver) = delivery.receiver() else {
            return;
        };
        let key = (receiver.id().clone(), delivery.message().id().to_owned());
        self.deliveries.insert(key, delivery);
    }

    pub fn find_and_remove_delivery(
        &self,
        client: &ClientId,
        message_id: &str,
    ) -> Option<Arc<MessageDelivery>> {
        self.deliveries
            .remove(&(client.clone(), message_id.to_owned()))
            .map(|(_, delivery)| delivery)
    }

    /// Removes `delivery` if it is still the tracked entry for its key.
    pub fn remove_delivery(&self, delivery: &Arc<MessageDelivery>) -> bool {
        let Some(receiver) = delivery.receiver() else {
            return false;
        };
        let key = (receiver.id().clone(), delivery.message().id().to_owned());
        self.deliveries
            .remove_if(&key, |_, tracked| Arc::ptr_eq(tracked, delivery))
            .is_some()
    }

    /// Removes and returns every delivery whose deadline is at or before `now`.
    ///
    /// An entry resolved concurrently by an acknowledgment is not returned.
    pub fn take_expired(&self, now: Instant) -> Vec<Arc<MessageDelivery>> {
        let expired: Vec<DeliveryKey> = self
            .deliveries
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                self.deliveries
                    .remove_if(&key, |_, delivery| delivery.is_expired(now))
                    .map(|(_, delivery)| delivery)
            })
            .collect()
    }

    pub fn outstanding_count(&self) -> usize {
        self.deliveries.len()
    }

    pub fn clear(&self) {
        self.deliveries.clear();
    }
}
