use serde::Deserialize;
use std::{fs, path::Path};

use crate::core::broker::BrokerOptions;
use crate::core::queue::options::QueueOptions;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerOptions,
    /// Options of queues created without explicit ones.
    pub queues: QueueOptions,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let raw: String = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::queue::options::{QueueAckDecision, QueueType};

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [queues]
            queue_type = "round_robin"
            acknowledge = "wait_for_acknowledge"
            "#,
        )
        .unwrap();

        assert_eq!(config.broker, BrokerOptions::default());
        assert_eq!(config.queues.queue_type, QueueType::RoundRobin);
        assert_eq!(config.queues.acknowledge, QueueAckDecision::WaitForAcknowledge);
        assert_eq!(config.queues.acknowledge_timeout_ms, 15_000);
    }
}
