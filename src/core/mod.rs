pub mod auth;
pub mod broker;
pub mod client;
pub mod cluster;
pub mod decision;
pub mod delivery;
pub mod error;
pub mod events;
pub mod message;
pub mod queue;
pub mod store;
