//! Netting engine.
//!
//! Reconciles an incoming order intent against the open opposite-side
//! exposure on the same instrument before anything is sent to the venue:
//! existing positions are closed (fully, then partially) first, and only the
//! unconsumed remainder opens new exposure.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::{OpenPosition, OrderIntent};

/// One concrete instruction produced by netting. Each maps to exactly one
/// venue submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Close the whole position
    CloseFull { position: OpenPosition },
    /// Close `quantity` units of the position
    ClosePartial {
        position: OpenPosition,
        quantity: Decimal,
    },
    /// Open new exposure for `quantity` units at the intent's side
    OpenNew { quantity: Decimal },
}

impl Instruction {
    pub fn quantity(&self) -> Decimal {
        match self {
            Instruction::CloseFull { position } => position.size,
            Instruction::ClosePartial { quantity, .. } => *quantity,
            Instruction::OpenNew { quantity } => *quantity,
        }
    }
}

/// The netting router. Pure: no I/O, no shared state.
pub struct Router {
    /// Administrative gate: when false, intents are logged and dropped
    /// without producing instructions (and so never reach the venue or the
    /// lifecycle store).
    send_orders: bool,
}

impl Router {
    pub fn new(send_orders: bool) -> Self {
        Self { send_orders }
    }

    pub fn is_enabled(&self) -> bool {
        self.send_orders
    }

    /// Net an intent against the opposite-side candidates for its
    /// instrument. Candidates are consumed oldest-open-first (trade id
    /// breaks ties), regardless of the order the caller supplies.
    pub fn route(&self, intent: &OrderIntent, candidates: &[OpenPosition]) -> Vec<Instruction> {
        if !self.send_orders {
            info!(
                "Order for {} received but not sent (routing disabled)",
                intent.instrument
            );
            return Vec::new();
        }

        let mut candidates: Vec<&OpenPosition> = candidates
            .iter()
            .filter(|p| p.instrument == intent.instrument && p.side == intent.side.opposite())
            .collect();
        candidates.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.trade_id.cmp(&b.trade_id))
        });

        let mut instructions = Vec::new();
        let mut remaining = intent.quantity;

        for position in candidates {
            if remaining <= Decimal::ZERO {
                break;
            }
            if remaining >= position.size {
                remaining -= position.size;
                instructions.push(Instruction::CloseFull {
                    position: position.clone(),
                });
            } else {
                instructions.push(Instruction::ClosePartial {
                    position: position.clone(),
                    quantity: remaining,
                });
                remaining = Decimal::ZERO;
            }
        }

        if remaining > Decimal::ZERO {
            instructions.push(Instruction::OpenNew {
                quantity: remaining,
            });
        }

        debug!(
            "Netted intent {} ({} {} {}) into {} instruction(s)",
            intent.intent_id,
            intent.side,
            intent.quantity,
            intent.instrument,
            instructions.len()
        );
        instructions
    }
}
