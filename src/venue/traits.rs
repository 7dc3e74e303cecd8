use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::{OpenPosition, OrderFill, OrderType, Side};
use crate::error::Result;

/// What a submission does at the venue: open fresh exposure, or close an
/// existing trade in full or in part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitKind {
    Open,
    CloseFull { trade_id: String },
    ClosePartial { trade_id: String },
}

impl std::fmt::Display for SubmitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitKind::Open => write!(f, "open"),
            SubmitKind::CloseFull { trade_id } => write!(f, "close_full({})", trade_id),
            SubmitKind::ClosePartial { trade_id } => write!(f, "close_partial({})", trade_id),
        }
    }
}

/// One concrete submission instruction handed to the venue adapter.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub sender_ref: String,
    pub instrument: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub kind: SubmitKind,
}

/// Venue acknowledgement of a submission.
#[derive(Debug, Clone)]
pub struct VenueAck {
    pub venue_order_id: String,
}

/// Execution-venue adapter contract.
///
/// Implementations wrap one broker or exchange API. Calls may block on the
/// network; callers bound every call with a timeout and classify failures
/// through [`crate::error::BrokerError::is_transient`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue name, e.g. "paper"
    fn name(&self) -> &str;

    /// Submit an order. Ok carries the venue-assigned order id.
    async fn submit(&self, request: &SubmitRequest) -> Result<VenueAck>;

    /// Cancel an open order by venue id.
    async fn cancel(&self, venue_order_id: &str) -> Result<()>;

    /// Fetch execution state for one order. None when the venue does not
    /// know the id (yet).
    async fn fetch_order_info(&self, venue_order_id: &str) -> Result<Option<OrderFill>>;

    /// Fetch all open positions, keyed by venue trade id.
    async fn fetch_open_positions(&self) -> Result<HashMap<String, OpenPosition>>;

    /// Fetch total account equity.
    async fn fetch_balance(&self) -> Result<Decimal>;
}
