#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use relaymq::core::message::{Acknowledgment, ClientFrame, DeliveredMessage};
use relaymq::{Broker, BrokerOptions};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout, Instant};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        relaymq::logging::init_logging();
    });
}

/// Broker with short maintenance, deadline and error put-back periods.
pub fn fast_broker() -> Arc<Broker> {
    init_logging();
    Broker::new(BrokerOptions {
        maintenance_interval_ms: 50,
        time_keeper_interval_ms: 20,
        error_put_back_delay_ms: 50,
        ..BrokerOptions::default()
    })
}

/// Next message frame, skipping acknowledgments.
pub async fn next_message(rx: &mut UnboundedReceiver<ClientFrame>) -> DeliveredMessage {
    loop {
        let frame = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("client channel closed");
        if let ClientFrame::Message(message) = frame {
            return message;
        }
    }
}

/// Next acknowledgment frame, skipping messages.
pub async fn next_ack(rx: &mut UnboundedReceiver<ClientFrame>) -> Acknowledgment {
    loop {
        let frame = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for an acknowledgment")
            .expect("client channel closed");
        if let ClientFrame::Acknowledgment(ack) = frame {
            return ack;
        }
    }
}

/// True if no message frame arrives within `window`.
pub async fn no_message_within(rx: &mut UnboundedReceiver<ClientFrame>, window: Duration) -> bool {
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, rx.recv()).await {
            Err(_) | Ok(None) => return true,
            Ok(Some(ClientFrame::Message(_))) => return false,
            Ok(Some(ClientFrame::Acknowledgment(_))) => continue,
        }
    }
}

/// Polls `condition` until it holds or `within` elapses.
pub async fn eventually(within: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
