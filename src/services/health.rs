//! Liveness reporting to the external health collaborator.
//!
//! The collaborator contract is two calls: `check()` records a heartbeat,
//! `send(description, state)` reports a degraded state with a cause. The
//! bus-backed implementation publishes both on the `health` topic.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bus::{publish_event, EventBus};
use crate::domain::{HealthEvent, TOPIC_HEALTH};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthReporter: Send + Sync {
    /// Record a liveness heartbeat.
    async fn check(&self);

    /// Report a degraded/failed state. `state` 0 = failed, 1 = alive.
    async fn send(&self, description: &str, state: u8);
}

pub struct BusHealthReporter {
    bus: Arc<dyn EventBus>,
    /// Reporting service name, e.g. "broker_paper"
    service: String,
    /// Expected heartbeats per monitoring window on the collaborator side
    n_check: u32,
}

impl BusHealthReporter {
    pub fn new(bus: Arc<dyn EventBus>, service: &str, n_check: u32) -> Self {
        info!(
            "Health reporting as {} ({} checks per window)",
            service, n_check
        );
        Self {
            bus,
            service: service.to_string(),
            n_check,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn n_check(&self) -> u32 {
        self.n_check
    }
}

#[async_trait]
impl HealthReporter for BusHealthReporter {
    async fn check(&self) {
        let event = HealthEvent::alive(&self.service);
        if let Err(e) = publish_event(&self.bus, TOPIC_HEALTH, &event).await {
            warn!("Failed to publish heartbeat for {}: {}", self.service, e);
        }
    }

    async fn send(&self, description: &str, state: u8) {
        let event = if state == 0 {
            HealthEvent::degraded(&self.service, description)
        } else {
            HealthEvent::alive(&self.service)
        };
        if let Err(e) = publish_event(&self.bus, TOPIC_HEALTH, &event).await {
            warn!("Failed to publish health state for {}: {}", self.service, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;

    #[tokio::test]
    async fn check_publishes_alive_heartbeat() {
        let bus = Arc::new(InMemoryBus::new());
        let mut rx = bus.subscribe(TOPIC_HEALTH).await.expect("subscribe");
        let reporter = BusHealthReporter::new(bus, "broker_paper", 6);

        reporter.check().await;
        let event = rx.recv().await.expect("heartbeat");
        assert_eq!(event["service"], "broker_paper");
        assert_eq!(event["state"], 1);
    }

    #[tokio::test]
    async fn send_publishes_degraded_state_with_cause() {
        let bus = Arc::new(InMemoryBus::new());
        let mut rx = bus.subscribe(TOPIC_HEALTH).await.expect("subscribe");
        let reporter = BusHealthReporter::new(bus, "broker_paper", 6);

        reporter.send("venue connection refused", 0).await;
        let event = rx.recv().await.expect("report");
        assert_eq!(event["state"], 0);
        assert_eq!(event["description"], "venue connection refused");
    }
}
