mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_broker, next_ack, next_message, no_message_within};
use relaymq::core::auth::AllowListAuthenticator;
use relaymq::core::events::QueueEvent;
use relaymq::core::message::{headers, new_message, new_priority_message};
use relaymq::core::queue::{LimitExceededStrategy, QueueAckDecision};
use relaymq::{MessagingClient, PushResult, QueueError, QueueOptions, QueueStatus, SubscriptionResult};

#[tokio::test]
async fn third_push_exceeds_message_limit() {
    let broker = fast_broker();
    let options = QueueOptions {
        message_limit: 2,
        ..QueueOptions::default()
    };
    let queue = broker.create_queue("limited", Some(options)).unwrap();

    assert_eq!(queue.push(new_message("1"), None).await.unwrap(), PushResult::Success);
    assert_eq!(queue.push(new_message("2"), None).await.unwrap(), PushResult::Success);
    assert_eq!(queue.push(new_message("3"), None).await.unwrap(), PushResult::LimitExceeded);
    assert_eq!(queue.message_count(), 2);
}

#[tokio::test]
async fn delete_oldest_strategy_makes_room() {
    let broker = fast_broker();
    let options = QueueOptions {
        message_limit: 2,
        limit_exceeded_strategy: LimitExceededStrategy::DeleteOldestMessage,
        ..QueueOptions::default()
    };
    let queue = broker.create_queue("rolling", Some(options)).unwrap();

    for id in ["a", "b", "c"] {
        let result = queue.push(new_message(id).with_id(id), None).await.unwrap();
        assert_eq!(result, PushResult::Success);
    }
    assert_eq!(queue.message_count(), 2);

    let (consumer, mut rx) = MessagingClient::new("consumer");
    assert_eq!(queue.add_client(consumer).await, SubscriptionResult::Success);
    assert_eq!(next_message(&mut rx).await.message_id, "b");
    assert_eq!(next_message(&mut rx).await.message_id, "c");
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let broker = fast_broker();
    let options = QueueOptions {
        message_size_limit: 4,
        ..QueueOptions::default()
    };
    let queue = broker.create_queue("small", Some(options)).unwrap();

    assert_eq!(queue.push(new_message("tiny"), None).await.unwrap(), PushResult::Success);
    assert_eq!(
        queue.push(new_message("too large"), None).await.unwrap(),
        PushResult::LimitExceeded
    );
}

#[tokio::test]
async fn message_without_subscribers_stays_in_store() {
    let broker = fast_broker();
    let queue = broker.find_or_create_queue("idle");

    assert_eq!(queue.push(new_message("kept"), None).await.unwrap(), PushResult::Success);
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(queue.message_count(), 1);
    assert_eq!(queue.info().sent, 0);
}

#[tokio::test]
async fn every_subscriber_receives_a_pushed_message() {
    let broker = fast_broker();
    let queue = broker.find_or_create_queue("fanout");
    queue.initialize(None).await.unwrap();

    let (first, mut first_rx) = MessagingClient::new("first");
    let (second, mut second_rx) = MessagingClient::new("second");
    queue.add_client(first).await;
    queue.add_client(second).await;

    queue.push(new_message("hello").with_id("m1"), None).await.unwrap();

    let a = next_message(&mut first_rx).await;
    let b = next_message(&mut second_rx).await;
    assert_eq!(a.message_id, "m1");
    assert_eq!(b.message_id, "m1");
    assert_eq!(&a.payload[..], b"hello");
    assert!(!a.ack_required);
}

#[tokio::test]
async fn priority_messages_are_delivered_first() {
    let broker = fast_broker();
    let queue = broker.find_or_create_queue("priorities");

    queue.push(new_message("r").with_id("regular"), None).await.unwrap();
    queue.push(new_priority_message("p").with_id("urgent"), None).await.unwrap();

    let (consumer, mut rx) = MessagingClient::new("consumer");
    queue.add_client(consumer).await;

    assert_eq!(next_message(&mut rx).await.message_id, "urgent");
    assert_eq!(next_message(&mut rx).await.message_id, "regular");
}

#[tokio::test]
async fn producer_is_acknowledged_after_receive() {
    let broker = fast_broker();
    let queue = broker.find_or_create_queue("commits");
    let (producer, mut producer_rx) = MessagingClient::new("producer");

    let result = queue
        .push(new_message("x").with_id("m1"), Some(producer))
        .await
        .unwrap();

    assert_eq!(result, PushResult::Success);
    let ack = next_ack(&mut producer_rx).await;
    assert_eq!(ack.message_id, "m1");
    assert!(ack.is_positive());
}

#[tokio::test]
async fn first_message_configures_the_queue_and_loses_operational_headers() {
    let broker = fast_broker();
    let queue = broker.find_or_create_queue("configured");
    let (consumer, mut rx) = MessagingClient::new("consumer");
    queue.add_client(consumer).await;

    let message = new_message("x")
        .with_header(headers::ACKNOWLEDGE, "request")
        .with_header(headers::QUEUE_TOPIC, "billing")
        .with_header("x-trace", "abc");
    queue.push(message, None).await.unwrap();

    assert_eq!(queue.options().acknowledge, QueueAckDecision::JustRequest);
    assert_eq!(queue.topic().as_deref(), Some("billing"));

    let delivered = next_message(&mut rx).await;
    assert!(delivered.ack_required);
    assert_eq!(delivered.headers.get("x-trace"), Some("abc"));
    assert!(!delivered.headers.contains(headers::ACKNOWLEDGE));
    assert!(!delivered.headers.contains(headers::QUEUE_TOPIC));
}

#[tokio::test]
async fn unknown_manager_fails_initialization() {
    let broker = fast_broker();
    let queue = broker.find_or_create_queue("misconfigured");

    let message = new_message("x").with_header(headers::QUEUE_MANAGER, "Redis");
    let result = queue.push(message, None).await;

    assert!(matches!(result, Err(QueueError::ManagerNotFound(name)) if name == "Redis"));
    assert!(!queue.is_initialized());
}

#[tokio::test]
async fn paused_and_consume_only_queues_reject_pushes() {
    let broker = fast_broker();
    let queue = broker.find_or_create_queue("gated");
    queue.initialize(None).await.unwrap();

    assert!(queue.set_status(QueueStatus::Paused).await);
    assert_eq!(
        queue.push(new_message("x"), None).await.unwrap(),
        PushResult::StatusNotSupported
    );

    assert!(queue.set_status(QueueStatus::OnlyConsume).await);
    assert_eq!(
        queue.push(new_message("x"), None).await.unwrap(),
        PushResult::StatusNotSupported
    );

    assert!(queue.set_status(QueueStatus::Running).await);
    assert_eq!(queue.push(new_message("x"), None).await.unwrap(), PushResult::Success);
}

#[tokio::test]
async fn push_is_published_on_the_event_bus() {
    let broker = fast_broker();
    let mut events = broker.subscribe_events();
    let queue = broker.find_or_create_queue("observed");

    queue.push(new_message("x").with_id("m1"), None).await.unwrap();

    let pushed = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Ok(QueueEvent::Pushed { message_id, .. }) = events.recv().await {
                return message_id;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(pushed, "m1");
}

#[tokio::test]
async fn paused_queue_delivers_nothing() {
    let broker = fast_broker();
    let queue = broker.find_or_create_queue("frozen");
    queue.push(new_message("x"), None).await.unwrap();
    assert!(queue.set_status(QueueStatus::Paused).await);

    let (consumer, mut rx) = MessagingClient::new("consumer");
    queue.add_client(consumer).await;

    assert!(no_message_within(&mut rx, Duration::from_millis(150)).await);
    assert_eq!(queue.message_count(), 1);

    assert!(queue.set_status(QueueStatus::Running).await);
    next_message(&mut rx).await;
}

#[tokio::test]
async fn subscriptions_respect_authenticators_and_client_limit() {
    let broker = fast_broker();
    broker.add_authenticator(Arc::new(AllowListAuthenticator::new(["alice", "bob"])));
    let options = QueueOptions {
        client_limit: 1,
        ..QueueOptions::default()
    };
    let queue = broker.create_queue("guarded", Some(options)).unwrap();

    let (mallory, _m) = MessagingClient::new("mallory");
    let (alice, _a) = MessagingClient::new("alice");
    let (bob, _b) = MessagingClient::new("bob");

    assert_eq!(queue.add_client(mallory).await, SubscriptionResult::Unauthorized);
    assert_eq!(queue.add_client(Arc::clone(&alice)).await, SubscriptionResult::Success);
    assert_eq!(queue.add_client(alice).await, SubscriptionResult::Success);
    assert_eq!(queue.add_client(bob).await, SubscriptionResult::Full);
    assert_eq!(queue.clients_count(), 1);
}

#[tokio::test]
async fn disconnected_client_leaves_every_queue() {
    let broker = fast_broker();
    let orders = broker.find_or_create_queue("orders");
    let invoices = broker.find_or_create_queue("invoices");
    let (client, _rx) = MessagingClient::new("consumer");

    orders.add_client(Arc::clone(&client)).await;
    invoices.add_client(Arc::clone(&client)).await;
    assert_eq!(client.subscriptions().len(), 2);

    broker.client_disconnected(&client).await;

    assert_eq!(orders.clients_count(), 0);
    assert_eq!(invoices.clients_count(), 0);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn duplicate_queue_names_are_rejected() {
    let broker = fast_broker();
    broker.create_queue("unique", None).unwrap();

    let result = broker.create_queue("unique", None);
    assert!(matches!(result, Err(QueueError::QueueExists(name)) if name == "unique"));
    assert_eq!(broker.queue_names(), vec!["unique".to_owned()]);
}
