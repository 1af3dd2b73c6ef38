use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::decision::PutBackDecision;
use crate::core::message::{headers, Headers};

/// Distribution strategy bound to a queue at initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueType {
    /// Every subscriber receives every message.
    #[default]
    Push,
    /// One subscriber per message, rotating.
    RoundRobin,
    /// Consumers request messages explicitly.
    Pull,
}

/// Whether consumers acknowledge deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAckDecision {
    #[default]
    None,
    /// Acknowledgments are requested and tracked, sending does not wait.
    JustRequest,
    /// At most one unacknowledged delivery at a time.
    WaitForAcknowledge,
}

impl QueueAckDecision {
    pub fn is_required(self) -> bool {
        self != QueueAckDecision::None
    }
}

/// When the default delivery handler acknowledges the producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitWhen {
    None,
    #[default]
    AfterReceived,
    AfterSent,
    AfterAcknowledge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueDestroy {
    #[default]
    Disabled,
    /// Destroy when no consumer is subscribed.
    NoConsumers,
    /// Destroy when no message is stored or in flight.
    NoMessages,
    /// Both of the above.
    Empty,
}

/// What happens to a push that would exceed `message_limit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitExceededStrategy {
    #[default]
    RejectNewMessage,
    DeleteOldestMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    pub queue_type: QueueType,
    pub acknowledge: QueueAckDecision,
    pub acknowledge_timeout_ms: u64,
    /// Maximum time a message may wait in the store. 0 disables the deadline.
    pub message_timeout_ms: u64,
    /// Put-back mode used by the default handler on negative or missing acknowledgment.
    pub put_back: PutBackDecision,
    pub put_back_delay_ms: u64,
    pub delay_between_messages_ms: u64,
    /// 0 means unlimited.
    pub message_limit: usize,
    /// Maximum payload length in bytes. 0 means unlimited.
    pub message_size_limit: usize,
    /// 0 means unlimited.
    pub client_limit: usize,
    pub limit_exceeded_strategy: LimitExceededStrategy,
    pub commit_when: CommitWhen,
    pub auto_destroy: QueueDestroy,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            queue_type: QueueType::Push,
            acknowledge: QueueAckDecision::None,
            acknowledge_timeout_ms: 15_000,
            message_timeout_ms: 0,
            put_back: PutBackDecision::Regular,
            put_back_delay_ms: 0,
            delay_between_messages_ms: 0,
            message_limit: 0,
            message_size_limit: 0,
            client_limit: 0,
            limit_exceeded_strategy: LimitExceededStrategy::RejectNewMessage,
            commit_when: CommitWhen::AfterReceived,
            auto_destroy: QueueDestroy::Disabled,
        }
    }
}

impl QueueOptions {
    pub fn acknowledge_timeout(&self) -> Duration {
        Duration::from_millis(self.acknowledge_timeout_ms)
    }

    pub fn message_timeout(&self) -> Option<Duration> {
        (self.message_timeout_ms > 0).then(|| Duration::from_millis(self.message_timeout_ms))
    }

    pub fn put_back_delay(&self) -> Duration {
        Duration::from_millis(self.put_back_delay_ms)
    }

    pub fn delay_between_messages(&self) -> Duration {
        Duration::from_millis(self.delay_between_messages_ms)
    }

    /// Applies queue-configuring headers carried by the first produced message.
    ///
    /// Timeouts in headers are in seconds, delays in milliseconds. Values that
    /// fail to parse are ignored.
    pub fn apply_headers(&mut self, message_headers: &Headers) {
        for (key, value) in message_headers.iter() {
            if key.eq_ignore_ascii_case(headers::ACKNOWLEDGE) {
                set_parsed(&mut self.acknowledge, key, value);
            } else if key.eq_ignore_ascii_case(headers::QUEUE_TYPE) {
                set_parsed(&mut self.queue_type, key, value);
            } else if key.eq_ignore_ascii_case(headers::PUT_BACK) {
                set_parsed(&mut self.put_back, key, value);
            } else if key.eq_ignore_ascii_case(headers::PUT_BACK_DELAY) {
                set_parsed(&mut self.put_back_delay_ms, key, value);
            } else if key.eq_ignore_ascii_case(headers::MESSAGE_TIMEOUT) {
                if let Some(ms) = parse_seconds(key, value) {
                    self.message_timeout_ms = ms;
                }
            } else if key.eq_ignore_ascii_case(headers::ACK_TIMEOUT) {
                if let Some(ms) = parse_seconds(key, value) {
                    self.acknowledge_timeout_ms = ms;
                }
            } else if key.eq_ignore_ascii_case(headers::DELAY_BETWEEN_MESSAGES) && !value.is_empty() {
                set_parsed(&mut self.delay_between_messages_ms, key, value);
            }
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(target: "relaymq::queue", header = key, value, "Ignoring unparsable option header");
            None
        }
    }
}

/// Parses a whole-second header value into milliseconds.
fn parse_seconds(key: &str, value: &str) -> Option<u64> {
    let secs = parse_or_warn::<u64>(key, value)?;
    let ms = secs.checked_mul(1000);
    if ms.is_none() {
        warn!(target: "relaymq::queue", header = key, value, "Ignoring out of range option header");
    }
    ms
}

fn set_parsed<T: FromStr>(slot: &mut T, key: &str, value: &str) {
    if let Some(parsed) = parse_or_warn(key, value) {
        *slot = parsed;
    }
}

/// Error returned when an option value in a header is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown option value '{0}'")]
pub struct UnknownOption(pub String);

impl FromStr for QueueAckDecision {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "request" | "just-request" | "just_request" => Ok(Self::JustRequest),
            "wait" | "wait-for-acknowledge" | "wait_for_acknowledge" => {
                Ok(Self::WaitForAcknowledge)
            }
            _ => Err(UnknownOption(s.to_owned())),
        }
    }
}

impl FromStr for QueueType {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "round-robin" | "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            "pull" => Ok(Self::Pull),
            _ => Err(UnknownOption(s.to_owned())),
        }
    }
}

impl FromStr for PutBackDecision {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "no" | "none" => Ok(Self::No),
            "regular" => Ok(Self::Regular),
            "priority" => Ok(Self::Priority),
            _ => Err(UnknownOption(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_override_options() {
        let mut options = QueueOptions::default();
        let headers: Headers = [
            ("acknowledge", "wait"),
            ("Queue-Type", "round-robin"),
            ("Put-Back", "priority"),
            ("Put-Back-Delay", "250"),
            ("Message-Timeout", "30"),
            ("Ack-Timeout", "5"),
            ("Delay-Between-Messages", "10"),
        ]
        .into_iter()
        .collect();

        options.apply_headers(&headers);

        assert_eq!(options.acknowledge, QueueAckDecision::WaitForAcknowledge);
        assert_eq!(options.queue_type, QueueType::RoundRobin);
        assert_eq!(options.put_back, PutBackDecision::Priority);
        assert_eq!(options.put_back_delay_ms, 250);
        assert_eq!(options.message_timeout_ms, 30_000);
        assert_eq!(options.acknowledge_timeout_ms, 5_000);
        assert_eq!(options.delay_between_messages_ms, 10);
    }

    #[test]
    fn unparsable_header_keeps_previous_value() {
        let mut options = QueueOptions::default();
        let headers: Headers = [("Queue-Type", "broadcast"), ("Ack-Timeout", "soon")]
            .into_iter()
            .collect();

        options.apply_headers(&headers);

        assert_eq!(options, QueueOptions::default());
    }

    #[test]
    fn out_of_range_timeouts_are_ignored() {
        let mut options = QueueOptions::default();
        let headers: Headers = [
            ("Message-Timeout", "18446744073709552"),
            ("Ack-Timeout", "18446744073709551615"),
        ]
        .into_iter()
        .collect();

        options.apply_headers(&headers);

        assert_eq!(options.message_timeout_ms, 0);
        assert_eq!(options.acknowledge_timeout_ms, 15_000);
    }
}
