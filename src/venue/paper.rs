//! Simulated venue for dry runs and tests.
//!
//! Market orders fill immediately and move the simulated position set;
//! limit orders rest open until cancelled. Deterministic, no I/O.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use async_trait::async_trait;

use super::traits::{SubmitKind, SubmitRequest, VenueAck, VenueAdapter};
use crate::domain::{OpenPosition, OrderFill, OrderStatus, OrderType};
use crate::error::{BrokerError, Result};

const PAPER_FEE_RATE: Decimal = dec!(0.001);

#[derive(Debug, Clone)]
struct PaperOrder {
    fill: OrderFill,
}

pub struct PaperVenue {
    equity: RwLock<Decimal>,
    orders: RwLock<HashMap<String, PaperOrder>>,
    positions: RwLock<HashMap<String, OpenPosition>>,
    mark_prices: RwLock<HashMap<String, Decimal>>,
    commission_currency: String,
}

impl PaperVenue {
    pub fn new() -> Self {
        Self {
            equity: RwLock::new(dec!(10000)),
            orders: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            mark_prices: RwLock::new(HashMap::new()),
            commission_currency: "USD".to_string(),
        }
    }

    pub async fn with_equity(self, equity: Decimal) -> Self {
        *self.equity.write().await = equity;
        self
    }

    /// Seed an open position, as if it had been opened earlier.
    pub async fn seed_position(&self, position: OpenPosition) {
        self.positions
            .write()
            .await
            .insert(position.trade_id.clone(), position);
    }

    pub async fn set_mark_price(&self, instrument: &str, price: Decimal) {
        self.mark_prices
            .write()
            .await
            .insert(instrument.to_string(), price);
    }

    async fn fill_price(&self, request: &SubmitRequest) -> Result<Decimal> {
        if let Some(price) = request.price {
            return Ok(price);
        }
        self.mark_prices
            .read()
            .await
            .get(&request.instrument)
            .copied()
            .ok_or_else(|| {
                BrokerError::VenueRejected(format!(
                    "no market price for {}",
                    request.instrument
                ))
            })
    }

    /// Apply a filled submission to the simulated position set.
    async fn apply_to_positions(&self, request: &SubmitRequest) {
        let mut positions = self.positions.write().await;
        match &request.kind {
            SubmitKind::Open => {
                let trade_id = Uuid::new_v4().to_string();
                positions.insert(
                    trade_id.clone(),
                    OpenPosition {
                        trade_id,
                        instrument: request.instrument.clone(),
                        side: request.side,
                        size: request.quantity,
                        opened_at: Utc::now(),
                    },
                );
            }
            SubmitKind::CloseFull { trade_id } => {
                positions.remove(trade_id);
            }
            SubmitKind::ClosePartial { trade_id } => {
                if let Some(position) = positions.get_mut(trade_id) {
                    position.size -= request.quantity;
                    if position.size <= Decimal::ZERO {
                        positions.remove(trade_id);
                    }
                }
            }
        }
    }
}

impl Default for PaperVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for PaperVenue {
    fn name(&self) -> &str {
        "paper"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<VenueAck> {
        if let SubmitKind::CloseFull { trade_id } | SubmitKind::ClosePartial { trade_id } =
            &request.kind
        {
            if !self.positions.read().await.contains_key(trade_id) {
                return Err(BrokerError::VenueRejected(format!(
                    "unknown trade id {}",
                    trade_id
                )));
            }
        }

        let venue_order_id = Uuid::new_v4().to_string();
        let fill = match request.order_type {
            OrderType::Market => {
                let price = self.fill_price(request).await?;
                self.apply_to_positions(request).await;
                OrderFill {
                    executed_qty: request.quantity,
                    remaining_qty: Decimal::ZERO,
                    avg_price: Some(price),
                    status: OrderStatus::Closed,
                    commission: Some(request.quantity * price * PAPER_FEE_RATE),
                    commission_currency: Some(self.commission_currency.clone()),
                }
            }
            OrderType::Limit => OrderFill {
                executed_qty: Decimal::ZERO,
                remaining_qty: request.quantity,
                avg_price: None,
                status: OrderStatus::Open,
                commission: None,
                commission_currency: None,
            },
        };

        self.orders
            .write()
            .await
            .insert(venue_order_id.clone(), PaperOrder { fill });

        Ok(VenueAck { venue_order_id })
    }

    async fn cancel(&self, venue_order_id: &str) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(venue_order_id)
            .ok_or_else(|| BrokerError::OrderNotFound(venue_order_id.to_string()))?;
        if order.fill.status == OrderStatus::Open {
            order.fill.status = OrderStatus::Cancelled;
        }
        Ok(())
    }

    async fn fetch_order_info(&self, venue_order_id: &str) -> Result<Option<OrderFill>> {
        Ok(self
            .orders
            .read()
            .await
            .get(venue_order_id)
            .map(|o| o.fill.clone()))
    }

    async fn fetch_open_positions(&self) -> Result<HashMap<String, OpenPosition>> {
        Ok(self.positions.read().await.clone())
    }

    async fn fetch_balance(&self) -> Result<Decimal> {
        Ok(*self.equity.read().await)
    }
}
