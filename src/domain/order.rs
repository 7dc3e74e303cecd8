use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
            OrderType::Limit => write!(f, "limit"),
        }
    }
}

impl std::str::FromStr for OrderType {
    type Err = BrokerError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            other => Err(BrokerError::Validation(format!(
                "order type not recognized: {}",
                other
            ))),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Intent received, record created, not yet sent to the venue
    Received,
    /// Submission to the venue is in flight
    Submitting,
    /// Acknowledged by the venue, still live
    Open,
    /// Partially executed, still live
    PartiallyFilled,
    /// Fully executed and closed by the venue
    Closed,
    /// Cancel acknowledged by the venue
    Cancelled,
    /// Permanent failure (rejection, validation, exhausted retries)
    Error,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Closed | OrderStatus::Cancelled | OrderStatus::Error
        )
    }

    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Received => "received",
            OrderStatus::Submitting => "submitting",
            OrderStatus::Open => "open",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Closed => "closed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// An order intent from upstream strategy logic, as delivered on the bus.
///
/// Immutable once parsed; lifecycle state lives on [`OrderRecord`]. The
/// order type stays the raw wire string so that an unrecognized kind still
/// yields an auditable error record instead of a dropped payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Caller-generated, globally unique identifier
    pub intent_id: String,
    pub instrument: String,
    pub side: Side,
    /// "market" or "limit"
    pub order_type: String,
    pub quantity: Decimal,
    /// Required for limit orders
    pub price: Option<Decimal>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    /// The typed order kind; errors on an unrecognized wire value.
    pub fn parsed_order_type(&self) -> Result<OrderType> {
        self.order_type.parse()
    }

    /// Validate before any venue call is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.intent_id.trim().is_empty() {
            return Err(BrokerError::Validation("intent_id must not be empty".into()));
        }
        if self.instrument.trim().is_empty() {
            return Err(BrokerError::Validation(
                "instrument must not be empty".into(),
            ));
        }
        let order_type = self.parsed_order_type()?;
        if self.quantity <= Decimal::ZERO {
            return Err(BrokerError::Validation(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if order_type == OrderType::Limit && self.price.is_none() {
            return Err(BrokerError::Validation(
                "limit order requires a price".into(),
            ));
        }
        Ok(())
    }
}

/// Fill information for one venue order, as reported by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub executed_qty: Decimal,
    pub remaining_qty: Decimal,
    pub avg_price: Option<Decimal>,
    pub status: OrderStatus,
    pub commission: Option<Decimal>,
    pub commission_currency: Option<String>,
}

/// One order tracked through its lifecycle.
///
/// A single intent can fan out into several records (netting); each carries a
/// `sender_ref` derived from the intent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Per-submission reference: `{intent_id}` or `{intent_id}_{n}` on fan-out
    pub sender_ref: String,
    pub intent_id: String,
    pub instrument: String,
    pub side: Side,
    /// Raw wire order type, kept verbatim for audit
    pub order_type: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    /// Venue trade id this submission closes (full or partial close)
    pub closes: Option<String>,
    /// Assigned by the venue on acknowledgement
    pub venue_order_id: Option<String>,
    pub status: OrderStatus,
    pub executed_qty: Decimal,
    pub remaining_qty: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub commission_currency: Option<String>,
    pub error_description: Option<String>,
    /// Transient retries spent on this record
    pub retries: u8,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn new(
        intent: &OrderIntent,
        sender_ref: String,
        quantity: Decimal,
        closes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            sender_ref,
            intent_id: intent.intent_id.clone(),
            instrument: intent.instrument.clone(),
            side: intent.side,
            order_type: intent.order_type.clone(),
            quantity,
            price: intent.price,
            closes,
            venue_order_id: None,
            status: OrderStatus::Received,
            executed_qty: Decimal::ZERO,
            remaining_qty: quantity,
            avg_fill_price: None,
            commission: None,
            commission_currency: None,
            error_description: None,
            retries: 0,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a poll result. Quantities are clamped so that
    /// `executed + remaining <= quantity` and `remaining` never grows.
    /// Returns true when any observable field changed.
    pub fn apply_fill(&mut self, fill: &OrderFill) -> bool {
        let executed = fill.executed_qty.min(self.quantity);
        let remaining = fill
            .remaining_qty
            .min(self.remaining_qty)
            .min(self.quantity - executed);

        let changed = self.status != fill.status
            || self.executed_qty != executed
            || self.remaining_qty != remaining
            || self.avg_fill_price != fill.avg_price
            || self.commission != fill.commission;

        if changed {
            self.status = fill.status;
            self.executed_qty = executed;
            self.remaining_qty = remaining;
            if fill.avg_price.is_some() {
                self.avg_fill_price = fill.avg_price;
            }
            if fill.commission.is_some() {
                self.commission = fill.commission;
                self.commission_currency = fill.commission_currency.clone();
            }
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Calculate fill percentage
    pub fn fill_pct(&self) -> Decimal {
        if self.quantity.is_zero() {
            return Decimal::ZERO;
        }
        self.executed_qty / self.quantity * Decimal::from(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn intent(quantity: Decimal, order_type: &str, price: Option<Decimal>) -> OrderIntent {
        OrderIntent {
            intent_id: "s1_1".to_string(),
            instrument: "ETH-USDC".to_string(),
            side: Side::Buy,
            order_type: order_type.to_string(),
            quantity,
            price,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn validate_rejects_non_positive_quantity() {
        let i = intent(dec!(0), "market", None);
        assert!(i.validate().is_err());
        let i = intent(dec!(-1), "market", None);
        assert!(i.validate().is_err());
    }

    #[test]
    fn validate_requires_price_for_limit() {
        let i = intent(dec!(1), "limit", None);
        assert!(i.validate().is_err());
        let i = intent(dec!(1), "limit", Some(dec!(1300)));
        assert!(i.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unrecognized_order_type() {
        let i = intent(dec!(1), "stop_loss", Some(dec!(1300)));
        let err = i.validate().expect_err("unknown kind");
        assert!(err.to_string().contains("not recognized"));
        assert!(intent(dec!(1), "market", None).parsed_order_type().is_ok());
    }

    #[test]
    fn intent_side_roundtrips_lowercase() {
        let json = serde_json::to_value(Side::Sell).expect("serialize side");
        assert_eq!(json, serde_json::json!("sell"));
    }

    #[test]
    fn apply_fill_clamps_quantities() {
        let i = intent(dec!(2), "market", None);
        let mut record = OrderRecord::new(&i, "s1_1".into(), dec!(2), None);

        let changed = record.apply_fill(&OrderFill {
            executed_qty: dec!(1.5),
            remaining_qty: dec!(0.5),
            avg_price: Some(dec!(1290)),
            status: OrderStatus::PartiallyFilled,
            commission: Some(dec!(0.01)),
            commission_currency: Some("USDC".into()),
        });
        assert!(changed);
        assert_eq!(record.executed_qty, dec!(1.5));
        assert_eq!(record.remaining_qty, dec!(0.5));

        // venue reports a larger remaining; clamped, never grows
        record.apply_fill(&OrderFill {
            executed_qty: dec!(1.5),
            remaining_qty: dec!(1.0),
            avg_price: Some(dec!(1290)),
            status: OrderStatus::PartiallyFilled,
            commission: None,
            commission_currency: None,
        });
        assert_eq!(record.remaining_qty, dec!(0.5));
        assert!(record.executed_qty + record.remaining_qty <= record.quantity);
    }

    #[test]
    fn apply_fill_is_noop_on_identical_state() {
        let i = intent(dec!(1), "market", None);
        let mut record = OrderRecord::new(&i, "s1_1".into(), dec!(1), None);
        let fill = OrderFill {
            executed_qty: dec!(1),
            remaining_qty: dec!(0),
            avg_price: Some(dec!(1300)),
            status: OrderStatus::Closed,
            commission: None,
            commission_currency: None,
        };
        assert!(record.apply_fill(&fill));
        assert!(!record.apply_fill(&fill));
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Closed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Error.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(OrderStatus::PartiallyFilled.is_live());
    }
}
