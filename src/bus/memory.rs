//! In-process event bus backed by per-topic mpsc channels.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::EventBus;
use crate::error::Result;

const SUBSCRIBER_BUFFER: usize = 256;

/// In-process bus. Every subscriber of a topic receives every event
/// published after it subscribed; subscribers that fall behind or drop
/// their receiver lose events (best-effort, like the real transport).
#[derive(Default)]
pub struct InMemoryBus {
    topics: RwLock<HashMap<String, Vec<mpsc::Sender<Value>>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        let mut topics = self.topics.write().await;
        let Some(subscribers) = topics.get_mut(topic) else {
            debug!("No subscribers on topic {}, dropping event", topic);
            return Ok(());
        };

        let mut dropped = 0usize;
        subscribers.retain(|tx| match tx.try_send(payload.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if dropped > 0 {
            warn!(
                "Dropped event on topic {} for {} slow subscriber(s)",
                topic, dropped
            );
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Value>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
