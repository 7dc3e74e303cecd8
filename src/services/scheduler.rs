//! Periodic polling: balance/liveness, position snapshots, and open-order
//! status. Three independent cadences, none of which blocks the order
//! consumer. A failed tick is logged (and, for the balance check, reported
//! to the health collaborator) and the loop carries on; the next tick
//! starts fresh.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::bus::{publish_event, EventBus};
use crate::config::PollingConfig;
use crate::domain::{
    BalanceEvent, PositionBook, PositionSnapshotEvent, TOPIC_BALANCE, TOPIC_POSITIONS,
};
use crate::lifecycle::retry::{with_retry, with_timeout};
use crate::lifecycle::LifecycleStore;
use crate::services::health::HealthReporter;
use crate::venue::VenueAdapter;

pub struct PollScheduler {
    venue: Arc<dyn VenueAdapter>,
    bus: Arc<dyn EventBus>,
    positions: Arc<PositionBook>,
    store: Arc<LifecycleStore>,
    health: Arc<dyn HealthReporter>,
    /// Account tag stamped on position snapshots
    account: String,
    venue_timeout: Duration,
    config: PollingConfig,
}

impl PollScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue: Arc<dyn VenueAdapter>,
        bus: Arc<dyn EventBus>,
        positions: Arc<PositionBook>,
        store: Arc<LifecycleStore>,
        health: Arc<dyn HealthReporter>,
        account: &str,
        venue_timeout: Duration,
        config: PollingConfig,
    ) -> Self {
        Self {
            venue,
            bus,
            positions,
            store,
            health,
            account: account.to_string(),
            venue_timeout,
            config,
        }
    }

    /// Spawn the three periodic loops. Each stops when the shutdown flag
    /// flips.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            "Scheduler: balance every {}s, positions every {}s, order status every {}s",
            self.config.balance_interval_secs,
            self.config.positions_interval_secs,
            self.config.order_status_interval_secs
        );

        let balance = {
            let scheduler = self.clone();
            let mut shutdown = shutdown.clone();
            let period = Duration::from_secs(scheduler.config.balance_interval_secs);
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => scheduler.run_balance_check().await,
                    }
                }
            })
        };

        let positions = {
            let scheduler = self.clone();
            let mut shutdown = shutdown.clone();
            let period = Duration::from_secs(scheduler.config.positions_interval_secs);
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => scheduler.run_position_snapshot().await,
                    }
                }
            })
        };

        let orders = {
            let scheduler = self;
            let mut shutdown = shutdown;
            let period = Duration::from_secs(scheduler.config.order_status_interval_secs);
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => scheduler.run_order_poll().await,
                    }
                }
            })
        };

        vec![balance, positions, orders]
    }

    /// Fetch equity, publish it, and heartbeat the health collaborator.
    /// On failure: report degraded and carry on (never fatal).
    pub async fn run_balance_check(&self) {
        let result = with_timeout(
            "fetch_balance",
            self.venue_timeout,
            self.venue.fetch_balance(),
        )
        .await;
        match result {
            Ok(equity) => {
                info!("Balance {} on venue {}", equity, self.venue.name());
                let event = BalanceEvent::new(equity);
                if let Err(e) = publish_event(&self.bus, TOPIC_BALANCE, &event).await {
                    warn!("Failed to publish balance event: {}", e);
                }
                self.health.check().await;
            }
            Err(e) => {
                error!("Error getting balance: {}", e);
                self.health.send(&e.to_string(), 0).await;
            }
        }
    }

    /// Fetch open positions, refresh the book, publish a snapshot. A failed
    /// snapshot is not retried; the next tick resubmits a fresh one.
    pub async fn run_position_snapshot(&self) {
        let result = with_timeout(
            "fetch_open_positions",
            self.venue_timeout,
            self.venue.fetch_open_positions(),
        )
        .await;
        match result {
            Ok(snapshot) => {
                self.positions.replace(snapshot.clone()).await;
                let event = PositionSnapshotEvent::new(&self.account, snapshot);
                if let Err(e) = publish_event(&self.bus, TOPIC_POSITIONS, &event).await {
                    warn!("Failed to publish position snapshot: {}", e);
                }
            }
            Err(e) => {
                error!("Error saving positions: {}", e);
            }
        }
    }

    /// Poll every live order once and apply the result to the lifecycle
    /// store. Exhausted retries mark the order as terminal error.
    pub async fn run_order_poll(&self) {
        let open = self.store.open_orders().await;
        if open.is_empty() {
            return;
        }
        debug!("Polling {} open order(s)", open.len());

        for (sender_ref, venue_order_id) in open {
            let polled = with_retry("fetch_order_info", || {
                with_timeout(
                    "fetch_order_info",
                    self.venue_timeout,
                    self.venue.fetch_order_info(&venue_order_id),
                )
            })
            .await;

            match polled {
                Ok(outcome) => match outcome.value {
                    Some(fill) => {
                        if let Err(e) = self.store.apply_poll(&sender_ref, &fill).await {
                            warn!("Cannot apply poll for {}: {}", sender_ref, e);
                        }
                    }
                    None => {
                        debug!(
                            "Venue does not know order {} ({}) yet",
                            sender_ref, venue_order_id
                        );
                    }
                },
                Err(failure) => {
                    if let Err(e) = self
                        .store
                        .mark_poll_error(&sender_ref, &failure.to_string())
                        .await
                    {
                        warn!("Cannot record poll error for {}: {}", sender_ref, e);
                    }
                }
            }
        }
    }
}
