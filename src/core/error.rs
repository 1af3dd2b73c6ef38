use thiserror::Error;

/// Hard failures surfaced to the caller.
///
/// Policy rejections (limits, status, authorization) are never errors; they are
/// reported through result enums such as [`PushResult`](crate::core::queue::PushResult).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no queue manager factory registered under '{0}'")]
    ManagerNotFound(String),

    #[error("queue '{queue}' could not be initialized: {source}")]
    Initialization {
        queue: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("queue '{0}' already exists")]
    QueueExists(String),

    #[error("queue '{0}' is destroyed")]
    Destroyed(String),
}
