//! Inbound order consumer.
//!
//! One task blocks on the `order` topic and, for each intent, runs the full
//! Router -> venue submission -> lifecycle mutation sequence before taking
//! the next event. Intents are therefore processed strictly in receipt
//! order, and a single intent's fan-out submits in the netting algorithm's
//! candidate order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::domain::{OrderEnvelope, OrderIntent, OrderRecord, OrderType, PositionBook, TOPIC_ORDER};
use crate::error::{BrokerError, Result};
use crate::lifecycle::retry::{with_retry, with_timeout};
use crate::lifecycle::{LifecycleStore, Slot};
use crate::router::{Instruction, Router};
use crate::venue::{SubmitKind, SubmitRequest, VenueAdapter};

pub struct OrderConsumer {
    bus: Arc<dyn EventBus>,
    venue: Arc<dyn VenueAdapter>,
    store: Arc<LifecycleStore>,
    positions: Arc<PositionBook>,
    router: Router,
    venue_timeout: Duration,
}

impl OrderConsumer {
    pub fn new(
        bus: Arc<dyn EventBus>,
        venue: Arc<dyn VenueAdapter>,
        store: Arc<LifecycleStore>,
        positions: Arc<PositionBook>,
        router: Router,
        venue_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            venue,
            store,
            positions,
            router,
            venue_timeout,
        }
    }

    /// Consume intents until shutdown. Never returns an error: every
    /// venue-facing failure resolves inside the lifecycle store.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut rx = match self.bus.subscribe(TOPIC_ORDER).await {
            Ok(rx) => rx,
            Err(e) => {
                error!("Cannot subscribe to {}: {}", TOPIC_ORDER, e);
                return;
            }
        };
        info!("Order consumer listening on topic {}", TOPIC_ORDER);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Order consumer shutting down");
                    break;
                }
                event = rx.recv() => {
                    match event {
                        Some(payload) => self.handle_payload(payload).await,
                        None => {
                            warn!("Order topic closed, consumer stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_payload(&self, payload: serde_json::Value) {
        let envelope: OrderEnvelope = match serde_json::from_value(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring malformed order payload: {}", e);
                return;
            }
        };
        if !envelope.is_order() {
            debug!("Ignoring event_type {}", envelope.event_type);
            return;
        }
        self.handle_intent(envelope.intent).await;
    }

    /// Process one intent to completion.
    pub async fn handle_intent(&self, intent: OrderIntent) {
        if !self.router.is_enabled() {
            // route() logs the drop; no lifecycle slot is taken
            let _ = self.router.route(&intent, &[]);
            return;
        }

        if let Err(e) = intent.validate() {
            let description = e.to_string();
            warn!("Rejecting intent {}: {}", intent.intent_id, description);
            let record = OrderRecord::new(
                &intent,
                intent.intent_id.clone(),
                intent.quantity,
                None,
            );
            let sender_ref = record.sender_ref.clone();
            if self.store.insert_pending(record).await.is_ok() {
                if let Err(e) = self.store.mark_failed(&sender_ref, &description, 0).await {
                    error!("Cannot record validation failure for {}: {}", sender_ref, e);
                }
            }
            return;
        }

        // validate() guarantees the wire order type parses
        let order_type = match intent.parsed_order_type() {
            Ok(order_type) => order_type,
            Err(e) => {
                error!("Intent {} passed validation with bad type: {}", intent.intent_id, e);
                return;
            }
        };

        let candidates = self
            .positions
            .close_candidates(&intent.instrument, intent.side)
            .await;
        let instructions = self.router.route(&intent, &candidates);

        let fan_out = instructions.len() > 1;
        for (index, instruction) in instructions.into_iter().enumerate() {
            let sender_ref = if fan_out {
                format!("{}_{}", intent.intent_id, index + 1)
            } else {
                intent.intent_id.clone()
            };
            self.submit_instruction(&intent, order_type, sender_ref, instruction)
                .await;
        }
    }

    async fn submit_instruction(
        &self,
        intent: &OrderIntent,
        order_type: OrderType,
        sender_ref: String,
        instruction: Instruction,
    ) {
        let (quantity, kind, closes) = match instruction {
            Instruction::CloseFull { position } => {
                info!(
                    "Sending order to close position {} in {} quantity {}",
                    position.trade_id, intent.instrument, position.size
                );
                (
                    position.size,
                    SubmitKind::CloseFull {
                        trade_id: position.trade_id.clone(),
                    },
                    Some(position.trade_id),
                )
            }
            Instruction::ClosePartial { position, quantity } => {
                info!(
                    "Sending order to partially close position {} in {} quantity {}",
                    position.trade_id, intent.instrument, quantity
                );
                (
                    quantity,
                    SubmitKind::ClosePartial {
                        trade_id: position.trade_id.clone(),
                    },
                    Some(position.trade_id),
                )
            }
            Instruction::OpenNew { quantity } => {
                info!(
                    "Sending order to venue in {} quantity {}",
                    intent.instrument, quantity
                );
                (quantity, SubmitKind::Open, None)
            }
        };

        let record = OrderRecord::new(intent, sender_ref.clone(), quantity, closes);
        if let Err(e) = self.store.insert_pending(record).await {
            error!("Cannot track order {}: {}", sender_ref, e);
            return;
        }
        if let Err(e) = self.store.mark_submitting(&sender_ref).await {
            error!("Cannot mark order {} submitting: {}", sender_ref, e);
            return;
        }

        let request = SubmitRequest {
            sender_ref: sender_ref.clone(),
            instrument: intent.instrument.clone(),
            side: intent.side,
            order_type,
            quantity,
            price: intent.price,
            kind,
        };

        let submit = with_retry("submit", || {
            with_timeout("submit", self.venue_timeout, self.venue.submit(&request))
        })
        .await;

        let result = match submit {
            Ok(outcome) => {
                self.store
                    .mark_open(&sender_ref, &outcome.value.venue_order_id, outcome.retries)
                    .await
            }
            Err(failure) => {
                self.store
                    .mark_failed(&sender_ref, &failure.error.to_string(), failure.retries)
                    .await
            }
        };
        if let Err(e) = result {
            error!("Lifecycle transition failed for {}: {}", sender_ref, e);
        }
    }

    /// Issue a cancel against an already-open order, under the standard
    /// retry budget. The `cancelled` status is observed by the next poll,
    /// never assumed here. A cancel that exhausts the retry budget is an
    /// adapter error on the order: the record goes terminal with the
    /// failure description and a status event.
    pub async fn cancel_order(&self, sender_ref: &str) -> Result<()> {
        let Some((slot, record)) = self.store.get(sender_ref).await else {
            return Err(BrokerError::UnknownOrder(sender_ref.to_string()));
        };
        if slot != Slot::Open {
            return Err(BrokerError::Validation(format!(
                "order {} is not open, cannot cancel",
                sender_ref
            )));
        }
        let venue_order_id = record
            .venue_order_id
            .ok_or_else(|| BrokerError::UnknownOrder(sender_ref.to_string()))?;

        match with_retry("cancel", || {
            with_timeout("cancel", self.venue_timeout, self.venue.cancel(&venue_order_id))
        })
        .await
        {
            Ok(_) => {
                info!("Cancel requested for order {} ({})", sender_ref, venue_order_id);
                Ok(())
            }
            Err(failure) => {
                warn!(
                    "Cancel failed for order {} ({}): {}",
                    sender_ref, venue_order_id, failure
                );
                let description = failure.to_string();
                self.store.mark_poll_error(sender_ref, &description).await?;
                Err(failure.error)
            }
        }
    }
}
