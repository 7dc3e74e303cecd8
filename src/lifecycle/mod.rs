//! Order lifecycle store.
//!
//! Owns the three disjoint collections (pending, open, terminal) and every
//! state transition between them. All mutation goes through this store's one
//! write lock, so a sender reference lives in exactly one collection at any
//! time and cross-collection moves are atomic for readers. Records are never
//! deleted (audit trail).
//!
//! Every transition that changes a record publishes a full snapshot on the
//! `order_status` topic; publish failures are logged, never retried.

pub mod retry;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bus::{publish_event, EventBus};
use crate::domain::{
    OrderFill, OrderRecord, OrderStatus, OrderStatusEvent, TOPIC_ORDER_STATUS,
};
use crate::error::{BrokerError, Result};

/// Which collection a record currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Pending,
    Open,
    Terminal,
}

#[derive(Default)]
struct Collections {
    pending: HashMap<String, OrderRecord>,
    open: HashMap<String, OrderRecord>,
    terminal: HashMap<String, OrderRecord>,
}

impl Collections {
    fn contains(&self, sender_ref: &str) -> bool {
        self.pending.contains_key(sender_ref)
            || self.open.contains_key(sender_ref)
            || self.terminal.contains_key(sender_ref)
    }
}

pub struct LifecycleStore {
    collections: RwLock<Collections>,
    bus: Arc<dyn EventBus>,
}

impl LifecycleStore {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            collections: RwLock::new(Collections::default()),
            bus,
        }
    }

    /// Track a freshly created record. Fails on a duplicate sender
    /// reference anywhere in the store.
    pub async fn insert_pending(&self, record: OrderRecord) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains(&record.sender_ref) {
            return Err(BrokerError::DuplicateOrder(record.sender_ref.clone()));
        }
        debug!("Tracking order {} as pending", record.sender_ref);
        collections.pending.insert(record.sender_ref.clone(), record);
        Ok(())
    }

    /// Mark a pending record as in-flight to the venue. Internal
    /// bookkeeping, not one of the published machine edges.
    pub async fn mark_submitting(&self, sender_ref: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        let record = collections
            .pending
            .get_mut(sender_ref)
            .ok_or_else(|| BrokerError::UnknownOrder(sender_ref.to_string()))?;
        record.status = OrderStatus::Submitting;
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Submission acknowledged: pending -> open.
    pub async fn mark_open(
        &self,
        sender_ref: &str,
        venue_order_id: &str,
        retries: u8,
    ) -> Result<()> {
        let record = {
            let mut collections = self.collections.write().await;
            let mut record = collections
                .pending
                .remove(sender_ref)
                .ok_or_else(|| BrokerError::UnknownOrder(sender_ref.to_string()))?;
            record.status = OrderStatus::Open;
            record.venue_order_id = Some(venue_order_id.to_string());
            record.retries = retries;
            record.submitted_at = Some(chrono::Utc::now());
            record.updated_at = chrono::Utc::now();
            collections.open.insert(sender_ref.to_string(), record.clone());
            record
        };
        info!(
            "Order {} open on venue as {}",
            sender_ref, venue_order_id
        );
        self.publish_status(&record).await;
        Ok(())
    }

    /// Permanent submission failure: pending -> terminal(error).
    pub async fn mark_failed(
        &self,
        sender_ref: &str,
        description: &str,
        retries: u8,
    ) -> Result<()> {
        let record = {
            let mut collections = self.collections.write().await;
            let mut record = collections
                .pending
                .remove(sender_ref)
                .ok_or_else(|| BrokerError::UnknownOrder(sender_ref.to_string()))?;
            record.status = OrderStatus::Error;
            record.error_description = Some(description.to_string());
            record.retries = retries;
            record.updated_at = chrono::Utc::now();
            collections
                .terminal
                .insert(sender_ref.to_string(), record.clone());
            record
        };
        warn!("Order {} failed: {}", sender_ref, description);
        self.publish_status(&record).await;
        Ok(())
    }

    /// Apply a poll result to an open record.
    ///
    /// Partial fills keep the record in the open collection; closed or
    /// cancelled (or error) statuses move it to terminal. Polling a record
    /// that already reached a terminal slot is a no-op. Returns true when a
    /// transition was observed and published.
    pub async fn apply_poll(&self, sender_ref: &str, fill: &OrderFill) -> Result<bool> {
        let published = {
            let mut collections = self.collections.write().await;
            if collections.terminal.contains_key(sender_ref) {
                return Ok(false);
            }
            let Some(record) = collections.open.get_mut(sender_ref) else {
                return Err(BrokerError::UnknownOrder(sender_ref.to_string()));
            };

            let changed = record.apply_fill(fill);
            if !changed {
                return Ok(false);
            }
            let record = record.clone();
            if record.status.is_terminal() {
                collections.open.remove(sender_ref);
                collections
                    .terminal
                    .insert(sender_ref.to_string(), record.clone());
            }
            record
        };
        info!(
            "Order {} is {} ({}/{} filled)",
            sender_ref, published.status, published.executed_qty, published.quantity
        );
        self.publish_status(&published).await;
        Ok(true)
    }

    /// Poll failed permanently (or exhausted the retry budget):
    /// open -> terminal(error).
    pub async fn mark_poll_error(&self, sender_ref: &str, description: &str) -> Result<()> {
        let record = {
            let mut collections = self.collections.write().await;
            let mut record = collections
                .open
                .remove(sender_ref)
                .ok_or_else(|| BrokerError::UnknownOrder(sender_ref.to_string()))?;
            record.status = OrderStatus::Error;
            record.error_description = Some(description.to_string());
            record.updated_at = chrono::Utc::now();
            collections
                .terminal
                .insert(sender_ref.to_string(), record.clone());
            record
        };
        warn!("Order {} errored during poll: {}", sender_ref, description);
        self.publish_status(&record).await;
        Ok(())
    }

    /// Sender refs and venue ids of every order still live on the venue.
    pub async fn open_orders(&self) -> Vec<(String, String)> {
        self.collections
            .read()
            .await
            .open
            .values()
            .filter_map(|r| {
                r.venue_order_id
                    .as_ref()
                    .map(|venue_id| (r.sender_ref.clone(), venue_id.clone()))
            })
            .collect()
    }

    /// Locate a record. Test and diagnostics accessor.
    pub async fn get(&self, sender_ref: &str) -> Option<(Slot, OrderRecord)> {
        let collections = self.collections.read().await;
        if let Some(r) = collections.pending.get(sender_ref) {
            return Some((Slot::Pending, r.clone()));
        }
        if let Some(r) = collections.open.get(sender_ref) {
            return Some((Slot::Open, r.clone()));
        }
        if let Some(r) = collections.terminal.get(sender_ref) {
            return Some((Slot::Terminal, r.clone()));
        }
        None
    }

    /// (pending, open, terminal) sizes.
    pub async fn counts(&self) -> (usize, usize, usize) {
        let collections = self.collections.read().await;
        (
            collections.pending.len(),
            collections.open.len(),
            collections.terminal.len(),
        )
    }

    /// Best-effort status publication; exactly one attempt per transition.
    async fn publish_status(&self, record: &OrderRecord) {
        let event = OrderStatusEvent::from(record);
        if let Err(e) = publish_event(&self.bus, TOPIC_ORDER_STATUS, &event).await {
            warn!(
                "Failed to publish status for order {}: {}",
                record.sender_ref, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::domain::{OrderIntent, Side};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use tokio::sync::mpsc;

    async fn store_with_status_feed() -> (LifecycleStore, mpsc::Receiver<Value>) {
        let bus = Arc::new(InMemoryBus::new());
        let rx = bus
            .subscribe(TOPIC_ORDER_STATUS)
            .await
            .expect("subscribe status");
        (LifecycleStore::new(bus), rx)
    }

    fn record(sender_ref: &str, quantity: rust_decimal::Decimal) -> OrderRecord {
        let intent = OrderIntent {
            intent_id: "s1_1".to_string(),
            instrument: "ETH-USDC".to_string(),
            side: Side::Buy,
            order_type: "market".to_string(),
            quantity,
            price: Some(dec!(1300)),
            created_at: Utc::now(),
        };
        OrderRecord::new(&intent, sender_ref.to_string(), quantity, None)
    }

    fn fill(status: OrderStatus, executed: rust_decimal::Decimal, remaining: rust_decimal::Decimal) -> OrderFill {
        OrderFill {
            executed_qty: executed,
            remaining_qty: remaining,
            avg_price: Some(dec!(1300)),
            status,
            commission: None,
            commission_currency: None,
        }
    }

    #[tokio::test]
    async fn duplicate_sender_ref_is_rejected() {
        let (store, _rx) = store_with_status_feed().await;
        store
            .insert_pending(record("s1_1", dec!(1)))
            .await
            .expect("first insert");
        let err = store
            .insert_pending(record("s1_1", dec!(1)))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, BrokerError::DuplicateOrder(_)));
    }

    #[tokio::test]
    async fn record_is_in_exactly_one_collection_through_its_life() {
        let (store, _rx) = store_with_status_feed().await;
        store
            .insert_pending(record("s1_1", dec!(1)))
            .await
            .expect("insert");
        assert_eq!(store.counts().await, (1, 0, 0));

        store
            .mark_open("s1_1", "v-1", 0)
            .await
            .expect("acknowledge");
        assert_eq!(store.counts().await, (0, 1, 0));

        store
            .apply_poll("s1_1", &fill(OrderStatus::Closed, dec!(1), dec!(0)))
            .await
            .expect("close");
        assert_eq!(store.counts().await, (0, 0, 1));

        let (slot, rec) = store.get("s1_1").await.expect("present");
        assert_eq!(slot, Slot::Terminal);
        assert_eq!(rec.status, OrderStatus::Closed);
    }

    #[tokio::test]
    async fn submission_failure_moves_pending_to_terminal_error() {
        let (store, mut rx) = store_with_status_feed().await;
        store
            .insert_pending(record("s1_1", dec!(1)))
            .await
            .expect("insert");
        store
            .mark_failed("s1_1", "venue rejected: bad symbol", 0)
            .await
            .expect("fail");

        let (slot, rec) = store.get("s1_1").await.expect("present");
        assert_eq!(slot, Slot::Terminal);
        assert_eq!(rec.status, OrderStatus::Error);
        assert_eq!(
            rec.error_description.as_deref(),
            Some("venue rejected: bad symbol")
        );

        let event = rx.recv().await.expect("status event");
        assert_eq!(event["status"], "error");
    }

    #[tokio::test]
    async fn partial_fill_stays_open_and_publishes() {
        let (store, mut rx) = store_with_status_feed().await;
        store
            .insert_pending(record("s1_1", dec!(2)))
            .await
            .expect("insert");
        store.mark_open("s1_1", "v-1", 0).await.expect("open");
        let _ = rx.recv().await.expect("open event");

        let transitioned = store
            .apply_poll(
                "s1_1",
                &fill(OrderStatus::PartiallyFilled, dec!(1), dec!(1)),
            )
            .await
            .expect("poll");
        assert!(transitioned);

        let (slot, rec) = store.get("s1_1").await.expect("present");
        assert_eq!(slot, Slot::Open);
        assert_eq!(rec.status, OrderStatus::PartiallyFilled);
        let event = rx.recv().await.expect("partial event");
        assert_eq!(event["status"], "partially_filled");
    }

    #[tokio::test]
    async fn repolling_terminal_record_is_a_noop() {
        let (store, mut rx) = store_with_status_feed().await;
        store
            .insert_pending(record("s1_1", dec!(1)))
            .await
            .expect("insert");
        store.mark_open("s1_1", "v-1", 0).await.expect("open");
        store
            .apply_poll("s1_1", &fill(OrderStatus::Closed, dec!(1), dec!(0)))
            .await
            .expect("close");

        // drain the open + closed events
        let _ = rx.recv().await.expect("open event");
        let _ = rx.recv().await.expect("closed event");

        let transitioned = store
            .apply_poll("s1_1", &fill(OrderStatus::Closed, dec!(1), dec!(0)))
            .await
            .expect("re-poll");
        assert!(!transitioned);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn identical_poll_result_does_not_republish() {
        let (store, mut rx) = store_with_status_feed().await;
        store
            .insert_pending(record("s1_1", dec!(2)))
            .await
            .expect("insert");
        store.mark_open("s1_1", "v-1", 0).await.expect("open");
        let partial = fill(OrderStatus::PartiallyFilled, dec!(1), dec!(1));
        store.apply_poll("s1_1", &partial).await.expect("poll");
        let _ = rx.recv().await.expect("open event");
        let _ = rx.recv().await.expect("partial event");

        let transitioned = store.apply_poll("s1_1", &partial).await.expect("re-poll");
        assert!(!transitioned);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn poll_error_is_terminal_and_published() {
        let (store, mut rx) = store_with_status_feed().await;
        store
            .insert_pending(record("s1_1", dec!(1)))
            .await
            .expect("insert");
        store.mark_open("s1_1", "v-1", 0).await.expect("open");
        let _ = rx.recv().await.expect("open event");

        store
            .mark_poll_error("s1_1", "connection reset (after 1 retry)")
            .await
            .expect("poll error");

        let (slot, rec) = store.get("s1_1").await.expect("present");
        assert_eq!(slot, Slot::Terminal);
        assert_eq!(rec.status, OrderStatus::Error);
        let event = rx.recv().await.expect("error event");
        assert_eq!(event["status"], "error");
        assert!(store.open_orders().await.is_empty());
    }

    #[tokio::test]
    async fn open_orders_lists_venue_ids() {
        let (store, _rx) = store_with_status_feed().await;
        store
            .insert_pending(record("s1_1", dec!(1)))
            .await
            .expect("insert");
        store.mark_open("s1_1", "v-9", 0).await.expect("open");

        let open = store.open_orders().await;
        assert_eq!(open, vec![("s1_1".to_string(), "v-9".to_string())]);
    }
}
