use relaymq::config::load_config;
use relaymq::core::decision::PutBackDecision;
use relaymq::core::queue::{CommitWhen, LimitExceededStrategy, QueueAckDecision, QueueDestroy, QueueType};
use relaymq::{Broker, Config};

#[test]
fn load_config_matches_toml() {
    let cfg: Config = load_config("relaymq.toml").expect("failed to load config");

    assert_eq!(cfg.broker.maintenance_interval_ms, 5000);
    assert_eq!(cfg.broker.time_keeper_interval_ms, 1000);
    assert_eq!(cfg.broker.error_put_back_delay_ms, 1000);
    assert_eq!(cfg.broker.default_manager, "Default");
    assert_eq!(cfg.broker.event_capacity, 1024);

    assert_eq!(cfg.queues.queue_type, QueueType::Push);
    assert_eq!(cfg.queues.acknowledge, QueueAckDecision::JustRequest);
    assert_eq!(cfg.queues.acknowledge_timeout_ms, 15_000);
    assert_eq!(cfg.queues.put_back, PutBackDecision::Regular);
    assert_eq!(cfg.queues.message_limit, 10_000);
    assert_eq!(cfg.queues.message_size_limit, 1_048_576);
    assert_eq!(cfg.queues.limit_exceeded_strategy, LimitExceededStrategy::RejectNewMessage);
    assert_eq!(cfg.queues.commit_when, CommitWhen::AfterReceived);
    assert_eq!(cfg.queues.auto_destroy, QueueDestroy::Disabled);
}

#[test]
fn broker_uses_configured_queue_defaults() {
    let cfg: Config = load_config("relaymq.toml").expect("failed to load config");
    let broker = Broker::from_config(&cfg);

    assert_eq!(broker.options(), &cfg.broker);
    assert_eq!(broker.default_queue_options(), cfg.queues);
}

#[test]
fn missing_file_is_an_error() {
    assert!(load_config("does-not-exist.toml").is_err());
}
