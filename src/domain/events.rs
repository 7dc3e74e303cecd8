use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::order::{OrderIntent, OrderRecord};
use super::position::OpenPosition;

/// Inbound topic carrying order intents from strategy logic
pub const TOPIC_ORDER: &str = "order";
/// Outbound topic carrying full OrderRecord snapshots after every transition
pub const TOPIC_ORDER_STATUS: &str = "order_status";
/// Outbound topic carrying periodic open-position snapshots
pub const TOPIC_POSITIONS: &str = "positions";
/// Outbound topic carrying periodic equity readings
pub const TOPIC_BALANCE: &str = "balance";
/// Outbound topic carrying heartbeat / degraded-state reports
pub const TOPIC_HEALTH: &str = "health";

fn order_event_type() -> String {
    "order".to_string()
}

/// Wire envelope for the `order` topic. Payloads whose `event_type` is not
/// "order" are ignored by the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEnvelope {
    #[serde(default = "order_event_type")]
    pub event_type: String,
    #[serde(flatten)]
    pub intent: OrderIntent,
}

impl OrderEnvelope {
    pub fn is_order(&self) -> bool {
        self.event_type == "order"
    }
}

/// Full order snapshot published on `order_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusEvent {
    pub event_type: String,
    #[serde(flatten)]
    pub order: OrderRecord,
}

impl From<&OrderRecord> for OrderStatusEvent {
    fn from(record: &OrderRecord) -> Self {
        Self {
            event_type: "order_status".to_string(),
            order: record.clone(),
        }
    }
}

/// Open-position snapshot published on `positions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshotEvent {
    pub event_type: String,
    /// Account tag, e.g. "paper_positions"
    pub account: String,
    /// Instrument -> open positions, deterministic iteration order
    pub positions: BTreeMap<String, Vec<OpenPosition>>,
    /// Snapshot time, truncated to whole seconds UTC
    pub timestamp: DateTime<Utc>,
}

impl PositionSnapshotEvent {
    pub fn new(account: &str, snapshot: HashMap<String, OpenPosition>) -> Self {
        let mut positions: BTreeMap<String, Vec<OpenPosition>> = BTreeMap::new();
        for position in snapshot.into_values() {
            positions
                .entry(position.instrument.clone())
                .or_default()
                .push(position);
        }
        for group in positions.values_mut() {
            group.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));
        }
        Self {
            event_type: "positions".to_string(),
            account: account.to_string(),
            positions,
            timestamp: truncate_to_seconds(Utc::now()),
        }
    }
}

/// Equity reading published on `balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub event_type: String,
    pub equity: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl BalanceEvent {
    pub fn new(equity: Decimal) -> Self {
        Self {
            event_type: "balance".to_string(),
            equity,
            timestamp: truncate_to_seconds(Utc::now()),
        }
    }
}

/// Heartbeat or degraded-state report published on `health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    pub event_type: String,
    /// Reporting service name, e.g. "broker_paper"
    pub service: String,
    /// 1 = alive, 0 = degraded/failed
    pub state: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthEvent {
    pub fn alive(service: &str) -> Self {
        Self {
            event_type: "health".to_string(),
            service: service.to_string(),
            state: 1,
            description: None,
            timestamp: truncate_to_seconds(Utc::now()),
        }
    }

    pub fn degraded(service: &str, description: &str) -> Self {
        Self {
            event_type: "health".to_string(),
            service: service.to_string(),
            state: 0,
            description: Some(description.to_string()),
            timestamp: truncate_to_seconds(Utc::now()),
        }
    }
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}
