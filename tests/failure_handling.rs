mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{eventually, fast_broker, next_message};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use relaymq::core::client::MessagingClient;
use relaymq::core::cluster::{ClusterMode, ClusterNotifier, NodeState};
use relaymq::core::delivery::{DeliveryTracker, MessageDelivery};
use relaymq::core::events::ErrorHandler;
use relaymq::core::message::{headers, new_message, QueueMessage};
use relaymq::core::queue::{MemoryQueueManager, QueueManager, QueueManagerBuilder};
use relaymq::{Acknowledgment, Decision, DeliveryHandler, PushResult, Queue, QueueError};

#[derive(Default)]
struct RejectingProducerHandler {
    tracker: DeliveryTracker,
}

#[async_trait]
impl DeliveryHandler for RejectingProducerHandler {
    fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    async fn received_from_producer(
        &self,
        _queue: &Queue,
        _message: &Arc<QueueMessage>,
        _source: Option<&Arc<MessagingClient>>,
    ) -> anyhow::Result<Decision> {
        anyhow::bail!("producer hook failed")
    }

    async fn acknowledge_received(
        &self,
        _queue: &Queue,
        _ack: &Acknowledgment,
        _delivery: &MessageDelivery,
        _success: bool,
    ) -> anyhow::Result<Decision> {
        Ok(Decision::delete_message())
    }
}

#[derive(Default)]
struct RecordingErrors {
    hints: Mutex<Vec<String>>,
}

impl ErrorHandler for RecordingErrors {
    fn on_error(&self, hint: &str, _error: &anyhow::Error, _message: Option<&QueueMessage>) {
        self.hints.lock().push(hint.to_owned());
    }
}

struct FakeCluster {
    state: NodeState,
    accept: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    fn new(state: NodeState, accept: bool) -> Self {
        Self {
            state,
            accept,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ClusterNotifier for FakeCluster {
    fn mode(&self) -> ClusterMode {
        ClusterMode::Reliable
    }

    fn state(&self) -> NodeState {
        self.state
    }

    async fn send_queue_message(&self, _queue: &str, message: &QueueMessage) -> bool {
        self.calls.lock().push(format!("message:{}", message.id()));
        self.accept
    }

    fn send_put_back(&self, _queue: &str, message: &QueueMessage, _regular: bool) {
        self.calls.lock().push(format!("put_back:{}", message.id()));
    }

    fn send_message_removal(&self, _queue: &str, message: &QueueMessage) {
        self.calls.lock().push(format!("removal:{}", message.id()));
    }

    fn send_queue_removed(&self, queue: &str) {
        self.calls.lock().push(format!("queue_removed:{queue}"));
    }
}

#[derive(Default)]
struct SavingHandler {
    tracker: DeliveryTracker,
}

#[async_trait]
impl DeliveryHandler for SavingHandler {
    fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    async fn received_from_producer(
        &self,
        _queue: &Queue,
        _message: &Arc<QueueMessage>,
        _source: Option<&Arc<MessagingClient>>,
    ) -> anyhow::Result<Decision> {
        Ok(Decision::save_message())
    }

    async fn acknowledge_received(
        &self,
        _queue: &Queue,
        _ack: &Acknowledgment,
        _delivery: &MessageDelivery,
        _success: bool,
    ) -> anyhow::Result<Decision> {
        Ok(Decision::delete_message())
    }
}

fn register_manager<H>(broker: &relaymq::Broker, name: &str)
where
    H: DeliveryHandler + Default + 'static,
{
    broker.register_manager_factory(
        name,
        Arc::new(
            |_builder: QueueManagerBuilder| -> BoxFuture<'static, anyhow::Result<Arc<dyn QueueManager>>> {
                async {
                    let handler = Arc::new(H::default());
                    Ok(Arc::new(MemoryQueueManager::with_handler(handler)) as Arc<dyn QueueManager>)
                }
                .boxed()
            },
        ),
    );
}

#[tokio::test]
async fn handler_error_reports_and_puts_the_message_back() {
    let broker = fast_broker();
    let errors = Arc::new(RecordingErrors::default());
    broker.add_error_handler(errors.clone());
    register_manager::<RejectingProducerHandler>(&broker, "Rejecting");
    let queue = broker.find_or_create_queue("fragile");

    let message = new_message("x").with_header(headers::QUEUE_MANAGER, "Rejecting");
    let result = queue.push(message, None).await.unwrap();

    assert_eq!(result, PushResult::Error);
    assert_eq!(errors.hints.lock().as_slice(), ["PUSH"]);
    assert_eq!(queue.message_count(), 0);

    assert!(eventually(Duration::from_secs(1), || queue.message_count() == 1).await);
    let info = queue.info();
    assert_eq!(info.errors, 1);
    assert_eq!(info.put_back, 1);
}

#[tokio::test]
async fn failing_factory_surfaces_an_initialization_error() {
    let broker = fast_broker();
    broker.register_manager_factory(
        "Broken",
        Arc::new(
            |builder: QueueManagerBuilder| -> BoxFuture<'static, anyhow::Result<Arc<dyn QueueManager>>> {
                async move { Err(anyhow::anyhow!("no backend for '{}'", builder.queue)) }.boxed()
            },
        ),
    );
    let queue = broker.find_or_create_queue("unbacked");

    let result = queue.initialize(Some("Broken")).await;

    assert!(matches!(result, Err(QueueError::Initialization { queue, .. }) if queue == "unbacked"));
    assert!(!queue.is_initialized());
}

#[tokio::test]
async fn rejected_replication_keeps_the_message_out() {
    let broker = fast_broker();
    broker.set_cluster(Arc::new(FakeCluster::new(NodeState::Main, false)));
    let queue = broker.find_or_create_queue("replicated");

    let result = queue.push(new_message("x"), None).await.unwrap();

    assert_eq!(result, PushResult::Error);
    assert_eq!(queue.message_count(), 0);
    assert_eq!(queue.info().received, 0);
}

#[tokio::test]
async fn replica_node_refuses_producers() {
    let broker = fast_broker();
    broker.set_cluster(Arc::new(FakeCluster::new(NodeState::Replica, true)));
    let queue = broker.find_or_create_queue("follower");

    assert_eq!(
        queue.push(new_message("x"), None).await.unwrap(),
        PushResult::StatusNotSupported
    );

    assert_eq!(
        queue.push_by_node(new_message("x").with_id("m1")).await.unwrap(),
        PushResult::Success
    );
    assert_eq!(queue.message_count(), 1);
    assert_eq!(queue.info().received, 1);
}

#[tokio::test]
async fn replicated_message_follows_the_handler_decision() {
    let broker = fast_broker();
    broker.set_cluster(Arc::new(FakeCluster::new(NodeState::Replica, true)));
    register_manager::<SavingHandler>(&broker, "Saving");
    let queue = broker.find_or_create_queue("durable-follower");

    let message = new_message("x")
        .with_id("m1")
        .with_header(headers::QUEUE_MANAGER, "Saving");
    let result = queue.push_by_node(message).await.unwrap();

    assert_eq!(result, PushResult::Success);
    assert_eq!(queue.message_count(), 1);
    let info = queue.info();
    assert_eq!(info.received, 1);
    assert_eq!(info.saved, 1);
}

#[tokio::test]
async fn replicated_handler_error_puts_the_message_back() {
    let broker = fast_broker();
    let errors = Arc::new(RecordingErrors::default());
    broker.add_error_handler(errors.clone());
    register_manager::<RejectingProducerHandler>(&broker, "Rejecting");
    let queue = broker.find_or_create_queue("fragile-follower");

    let message = new_message("x").with_header(headers::QUEUE_MANAGER, "Rejecting");
    let result = queue.push_by_node(message).await.unwrap();

    assert_eq!(result, PushResult::Success);
    assert_eq!(errors.hints.lock().as_slice(), ["PUSH_BY_NODE"]);
    assert!(eventually(Duration::from_secs(1), || queue.message_count() == 1).await);
    assert_eq!(queue.info().put_back, 1);
}

#[tokio::test]
async fn main_node_replicates_each_change() {
    let broker = fast_broker();
    let cluster = Arc::new(FakeCluster::new(NodeState::Main, true));
    broker.set_cluster(cluster.clone());
    let queue = broker.find_or_create_queue("mirrored");
    let (consumer, mut rx) = MessagingClient::new("consumer");
    queue.add_client(consumer).await;

    queue.push(new_message("x").with_id("m1"), None).await.unwrap();
    next_message(&mut rx).await;
    assert!(eventually(Duration::from_secs(1), || queue.info().removed == 1).await);
    queue.destroy().await;

    assert_eq!(
        cluster.calls.lock().as_slice(),
        ["message:m1", "removal:m1", "queue_removed:mirrored"]
    );
}
