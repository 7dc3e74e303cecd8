//! Event-bus seam between the gateway and the pub/sub transport.
//!
//! The transport itself (RabbitMQ, NATS, ...) is an external collaborator;
//! the gateway only depends on this trait. [`memory::InMemoryBus`] is the
//! in-process implementation used by tests, dry runs and the demo binary.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{BrokerError, Result};

pub use memory::InMemoryBus;

/// Topic-keyed publish/subscribe transport, at-least-once-ish.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a JSON payload on a topic. Best-effort: delivery to every
    /// subscriber is not guaranteed.
    async fn publish(&self, topic: &str, payload: Value) -> Result<()>;

    /// Subscribe to a topic. Events published after the subscription are
    /// delivered in publish order.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Value>>;
}

/// Serialize-and-publish helper shared by all producers.
pub async fn publish_event<T: Serialize + Sync>(
    bus: &Arc<dyn EventBus>,
    topic: &str,
    event: &T,
) -> Result<()> {
    let payload = serde_json::to_value(event)
        .map_err(|e| BrokerError::Transport(format!("encode {} event: {}", topic, e)))?;
    bus.publish(topic, payload).await
}
