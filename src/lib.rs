//! RelayMQ – the queue delivery engine of a message broker.
//!
//! This crate exports
//!  * `core`    – messages, decisions, deliveries, stores, queues and the broker registry
//!  * `config`  – TOML-driven runtime configuration
//!  * `logging` – tracing subscriber setup
//!
//! Transport, persistence and cluster replication are plugged in by the
//! embedding server through the traits in `core`.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, Config};
pub use crate::core::broker::{Broker, BrokerOptions};
pub use crate::core::client::{ClientId, MessagingClient};
pub use crate::core::decision::{Decision, DecisionTransmission, PutBackDecision};
pub use crate::core::delivery::{DefaultDeliveryHandler, DeliveryHandler};
pub use crate::core::error::QueueError;
pub use crate::core::message::{Acknowledgment, ClientFrame, Message};
pub use crate::core::queue::{PushResult, Queue, QueueOptions, QueueStatus, SubscriptionResult};
