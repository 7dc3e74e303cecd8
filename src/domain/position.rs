use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::order::Side;

/// One open position as reported by the venue.
///
/// A read-only snapshot: the engine never mutates positions locally, it only
/// replaces the whole book from the next poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    /// Venue-assigned trade identifier
    pub trade_id: String,
    pub instrument: String,
    pub side: Side,
    pub size: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// In-memory view of currently open positions, keyed by venue trade id.
///
/// Written wholesale by the scheduler's position poll, read by the router as
/// netting input. All access goes through this one lock.
#[derive(Debug, Default)]
pub struct PositionBook {
    inner: RwLock<HashMap<String, OpenPosition>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole book with a fresh venue snapshot.
    pub async fn replace(&self, positions: HashMap<String, OpenPosition>) {
        *self.inner.write().await = positions;
    }

    pub async fn snapshot(&self) -> HashMap<String, OpenPosition> {
        self.inner.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Positions eligible for closing against an intent: same instrument,
    /// opposite side, oldest-open-first (trade id breaks ties).
    pub async fn close_candidates(&self, instrument: &str, intent_side: Side) -> Vec<OpenPosition> {
        let book = self.inner.read().await;
        let mut candidates: Vec<OpenPosition> = book
            .values()
            .filter(|p| p.instrument == instrument && p.side == intent_side.opposite())
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.trade_id.cmp(&b.trade_id))
        });
        candidates
    }
}
