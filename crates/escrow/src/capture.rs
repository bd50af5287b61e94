//! Capture coordinator — moves the advertiser's payment into escrow at
//! most once per booking. Duplicate or concurrent payment confirmations
//! reuse the existing capture instead of charging again.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use adspace_core::error::{MarketError, MarketResult};
use adspace_core::payments::{CaptureOutcome, PaymentGateway};
use adspace_core::types::{Booking, CaptureRecord};

/// Issues exactly one successful capture per booking.
#[derive(Clone)]
pub struct CaptureCoordinator {
    captures: Arc<DashMap<Uuid, CaptureRecord>>,
    gateway: Arc<dyn PaymentGateway>,
}

impl std::fmt::Debug for CaptureCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCoordinator")
            .field("captures", &self.captures.len())
            .finish()
    }
}

impl CaptureCoordinator {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            captures: Arc::new(DashMap::new()),
            gateway,
        }
    }

    pub fn get_by_booking(&self, booking_id: Uuid) -> Option<CaptureRecord> {
        self.captures.get(&booking_id).map(|r| r.value().clone())
    }

    /// Capture the booking's full amount into escrow. The gateway call runs
    /// under the booking's entry lock, so two concurrent confirmations
    /// serialize: the first charges, the second gets the same record back.
    /// A failed capture is not recorded; the advertiser retries payment.
    pub fn capture_for_booking(&self, booking: &Booking) -> MarketResult<CaptureRecord> {
        match self.captures.entry(booking.id) {
            Entry::Occupied(existing) => {
                info!(
                    booking_id = %booking.id,
                    external_ref = %existing.get().external_ref,
                    "Capture already performed, reusing"
                );
                Ok(existing.get().clone())
            }
            Entry::Vacant(slot) => {
                let amount = booking.pricing.total_amount;
                match self.gateway.capture(booking.id, amount) {
                    CaptureOutcome::Captured { reference } => {
                        let record = CaptureRecord {
                            id: Uuid::new_v4(),
                            booking_id: booking.id,
                            amount,
                            external_ref: reference,
                            captured_at: Utc::now(),
                        };
                        info!(
                            booking_id = %booking.id,
                            external_ref = %record.external_ref,
                            amount,
                            "Payment captured into escrow"
                        );
                        Ok(slot.insert(record).clone())
                    }
                    CaptureOutcome::Failed { reason } => {
                        warn!(booking_id = %booking.id, reason = %reason, "Capture failed");
                        Err(MarketError::Payment(reason))
                    }
                }
            }
        }
    }
}
