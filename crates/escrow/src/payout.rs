//! Payout scheduler — sequences the two-stage escrow release to space
//! owners. Stage amounts are fixed by the booking's pricing quote: the
//! install stage pays the installation fee, the rental stage pays the rest
//! of the owner payout.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use adspace_core::error::{MarketError, MarketResult};
use adspace_core::event_bus::{make_event, noop_sink, EventSink};
use adspace_core::payments::{PaymentGateway, TransferOutcome};
use adspace_core::types::{Booking, BookingStatus, EventType, Payout, PayoutStage, PayoutStatus};

/// Creates, transfers and retries the per-stage payout records.
#[derive(Clone)]
pub struct PayoutScheduler {
    payouts: Arc<DashMap<Uuid, Payout>>,
    by_booking_stage: Arc<DashMap<(Uuid, PayoutStage), Uuid>>,
    gateway: Arc<dyn PaymentGateway>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PayoutScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayoutScheduler")
            .field("payouts", &self.payouts.len())
            .finish()
    }
}

impl PayoutScheduler {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            payouts: Arc::new(DashMap::new()),
            by_booking_stage: Arc::new(DashMap::new()),
            gateway,
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for emitting notification events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn get(&self, payout_id: Uuid) -> MarketResult<Payout> {
        self.payouts
            .get(&payout_id)
            .map(|r| r.value().clone())
            .ok_or(MarketError::NotFound {
                entity: "payout",
                id: payout_id,
            })
    }

    pub fn list_by_booking(&self, booking_id: Uuid) -> Vec<Payout> {
        self.payouts
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Release the install-stage payout. Legal once the proof is approved,
    /// i.e. the booking reached `Verified` (or has progressed past it).
    pub fn release_install_stage(&self, booking: &Booking) -> MarketResult<Payout> {
        if !matches!(
            booking.status,
            BookingStatus::Verified | BookingStatus::Completed
        ) {
            return Err(MarketError::StateViolation {
                from: booking.status,
                action: "release_install_payout",
            });
        }
        self.release(booking, PayoutStage::Install, booking.pricing.installation_fee)
    }

    /// Release the rental-stage payout. Legal once the booking completed.
    pub fn release_rental_stage(&self, booking: &Booking) -> MarketResult<Payout> {
        if booking.status != BookingStatus::Completed {
            return Err(MarketError::StateViolation {
                from: booking.status,
                action: "release_rental_payout",
            });
        }
        self.release(booking, PayoutStage::Rental, booking.pricing.rental_portion())
    }

    /// Retry a failed payout in place. Never creates a duplicate record.
    pub fn retry(&self, payout_id: Uuid) -> MarketResult<Payout> {
        let payout = self.get(payout_id)?;
        if payout.held {
            return Err(MarketError::Validation(
                "payout is held pending dispute resolution".into(),
            ));
        }
        if payout.status != PayoutStatus::Failed {
            return Err(MarketError::Validation(format!(
                "only failed payouts can be retried (status: {:?})",
                payout.status
            )));
        }
        self.transfer(payout_id)
    }

    /// Re-trigger any stage releases that are due for this booking's
    /// current status. Used after a dispute hold is lifted.
    pub fn release_due_stages(&self, booking: &Booking) -> Vec<MarketResult<Payout>> {
        let mut results = Vec::new();
        if matches!(
            booking.status,
            BookingStatus::Verified | BookingStatus::Completed
        ) {
            results.push(self.release_install_stage(booking));
        }
        if booking.status == BookingStatus::Completed {
            results.push(self.release_rental_stage(booking));
        }
        results
    }

    /// Block every not-yet-settled payout for this booking from release.
    /// Held payouts are not cancelled; they resume after resolution.
    pub fn hold_for_dispute(&self, booking_id: Uuid) {
        for mut entry in self.payouts.iter_mut() {
            if entry.booking_id == booking_id
                && !matches!(
                    entry.status,
                    PayoutStatus::Completed | PayoutStatus::PartiallyPaid
                )
            {
                entry.held = true;
            }
        }
        info!(booking_id = %booking_id, "Payouts held for dispute");
    }

    /// Lift the dispute hold. Un-transferred records become releasable
    /// again; the caller re-triggers the stage releases that are now due.
    pub fn release_hold(&self, booking_id: Uuid) {
        for mut entry in self.payouts.iter_mut() {
            if entry.booking_id == booking_id {
                entry.held = false;
            }
        }
        info!(booking_id = %booking_id, "Payout hold released");
    }

    /// Idempotent stage release: at most one payout record per
    /// (booking, stage). Existing settled or in-flight records are returned
    /// unchanged; a failed or never-transferred record is (re)processed.
    fn release(
        &self,
        booking: &Booking,
        stage: PayoutStage,
        amount: f64,
    ) -> MarketResult<Payout> {
        if amount <= 0.0 {
            return Err(MarketError::Validation(format!(
                "{:?}-stage payout amount must be positive",
                stage
            )));
        }

        if let Some(existing_id) = self
            .by_booking_stage
            .get(&(booking.id, stage))
            .map(|r| *r.value())
        {
            let existing = self.get(existing_id)?;
            if existing.held {
                return Ok(existing);
            }
            return match existing.status {
                PayoutStatus::Pending | PayoutStatus::Failed => self.transfer(existing_id),
                _ => Ok(existing),
            };
        }

        let payout = Payout {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            owner_id: booking.owner_id,
            stage,
            amount,
            status: PayoutStatus::Pending,
            held: false,
            external_ref: None,
            failure_reason: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        let payout_id = payout.id;
        self.by_booking_stage.insert((booking.id, stage), payout_id);
        self.payouts.insert(payout_id, payout);

        info!(
            booking_id = %booking.id,
            payout_id = %payout_id,
            ?stage,
            amount,
            "Payout created"
        );
        self.transfer(payout_id)
    }

    fn transfer(&self, payout_id: Uuid) -> MarketResult<Payout> {
        let (booking_id, owner_id, amount) = {
            let mut entry = self.payouts.get_mut(&payout_id).ok_or(MarketError::NotFound {
                entity: "payout",
                id: payout_id,
            })?;
            entry.status = PayoutStatus::Processing;
            (entry.booking_id, entry.owner_id, entry.amount)
        };

        let outcome = self.gateway.transfer_to_owner(booking_id, owner_id, amount);

        let mut entry = self.payouts.get_mut(&payout_id).ok_or(MarketError::NotFound {
            entity: "payout",
            id: payout_id,
        })?;
        let now = Utc::now();
        match outcome {
            TransferOutcome::Settled { reference } => {
                entry.status = PayoutStatus::Completed;
                entry.external_ref = Some(reference);
                entry.failure_reason = None;
                entry.processed_at = Some(now);
            }
            TransferOutcome::PartiallySettled {
                reference,
                settled_amount,
            } => {
                entry.status = PayoutStatus::PartiallyPaid;
                entry.external_ref = Some(reference);
                entry.failure_reason = Some(format!(
                    "only {:.2} of {:.2} settled",
                    settled_amount, amount
                ));
                entry.processed_at = Some(now);
            }
            TransferOutcome::Failed { reason } => {
                entry.status = PayoutStatus::Failed;
                entry.failure_reason = Some(reason);
                entry.processed_at = Some(now);
            }
        }
        let updated = entry.value().clone();
        drop(entry);

        match updated.status {
            PayoutStatus::Completed => {
                info!(payout_id = %payout_id, booking_id = %booking_id, "Payout settled");
                self.event_sink.emit(make_event(
                    EventType::PayoutReleased,
                    booking_id,
                    Some(payout_id),
                    None,
                ));
            }
            PayoutStatus::PartiallyPaid => {
                warn!(payout_id = %payout_id, booking_id = %booking_id, "Payout partially settled");
                self.event_sink.emit(make_event(
                    EventType::PayoutFailed,
                    booking_id,
                    Some(payout_id),
                    updated.failure_reason.clone(),
                ));
            }
            _ => {
                warn!(payout_id = %payout_id, booking_id = %booking_id, "Payout failed");
                self.event_sink.emit(make_event(
                    EventType::PayoutFailed,
                    booking_id,
                    Some(payout_id),
                    updated.failure_reason.clone(),
                ));
            }
        }
        Ok(updated)
    }
}
