//! Refund coordinator — issues full or partial refunds on rejection,
//! missed-window cancellation, or dispute resolution, de-duplicated so a
//! retried trigger never double-refunds.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use adspace_core::error::{MarketError, MarketResult};
use adspace_core::event_bus::{make_event, noop_sink, EventSink};
use adspace_core::payments::{PaymentGateway, RefundOutcome};
use adspace_core::types::{Booking, EventType, RefundRecord, RefundStatus, RefundTrigger};

/// Emits exactly one refund instruction per (booking, trigger).
#[derive(Clone)]
pub struct RefundCoordinator {
    refunds: Arc<DashMap<Uuid, RefundRecord>>,
    by_trigger: Arc<DashMap<(Uuid, RefundTrigger), Uuid>>,
    gateway: Arc<dyn PaymentGateway>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RefundCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefundCoordinator")
            .field("refunds", &self.refunds.len())
            .finish()
    }
}

impl RefundCoordinator {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            refunds: Arc::new(DashMap::new()),
            by_trigger: Arc::new(DashMap::new()),
            gateway,
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for emitting notification events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn get(&self, refund_id: Uuid) -> MarketResult<RefundRecord> {
        self.refunds
            .get(&refund_id)
            .map(|r| r.value().clone())
            .ok_or(MarketError::NotFound {
                entity: "refund",
                id: refund_id,
            })
    }

    pub fn list_by_booking(&self, booking_id: Uuid) -> Vec<RefundRecord> {
        self.refunds
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Issue a refund for the given trigger. Pre-installation triggers
    /// (rejection, missed window) refund the full `total_amount`; dispute
    /// triggers must carry the policy-determined amount decided at
    /// resolution.
    ///
    /// Duplicate delivery of the same (booking, trigger) — e.g. a retried
    /// cancellation job — returns the existing record and issues nothing. A
    /// failed reversal is recorded for manual review, never silently
    /// retried; an ambiguous outcome (effect unknown) is parked the same
    /// way, since retrying could double-refund.
    pub fn issue_refund(
        &self,
        booking: &Booking,
        trigger: RefundTrigger,
        amount: Option<f64>,
    ) -> MarketResult<RefundRecord> {
        if let Some(existing_id) = self
            .by_trigger
            .get(&(booking.id, trigger))
            .map(|r| *r.value())
        {
            return self.get(existing_id);
        }

        let amount = match (trigger, amount) {
            (RefundTrigger::BookingRejected | RefundTrigger::MissedInstallation, _) => {
                booking.pricing.total_amount
            }
            (_, Some(a)) => a,
            (_, None) => {
                return Err(MarketError::Validation(
                    "dispute refunds require an explicit amount".into(),
                ))
            }
        };
        if amount <= 0.0 || amount > booking.pricing.total_amount {
            return Err(MarketError::Validation(format!(
                "refund amount {:.2} out of range (total {:.2})",
                amount, booking.pricing.total_amount
            )));
        }

        let outcome = self.gateway.refund(booking.id, amount);
        let (status, external_ref, failure_reason) = match outcome {
            RefundOutcome::Issued { reference } => (RefundStatus::Issued, Some(reference), None),
            RefundOutcome::Failed { reason } => (RefundStatus::Failed, None, Some(reason)),
            RefundOutcome::Ambiguous { reason } => {
                (RefundStatus::ManualReview, None, Some(reason))
            }
        };

        let record = RefundRecord {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            trigger,
            amount,
            status,
            external_ref,
            failure_reason,
            issued_at: Utc::now(),
        };
        self.by_trigger.insert((booking.id, trigger), record.id);
        self.refunds.insert(record.id, record.clone());

        match record.status {
            RefundStatus::Issued => {
                info!(
                    booking_id = %booking.id,
                    refund_id = %record.id,
                    ?trigger,
                    amount,
                    "Refund issued"
                );
                self.event_sink.emit(make_event(
                    EventType::RefundIssued,
                    booking.id,
                    Some(record.id),
                    None,
                ));
            }
            RefundStatus::Failed | RefundStatus::ManualReview => {
                warn!(
                    booking_id = %booking.id,
                    refund_id = %record.id,
                    ?trigger,
                    status = ?record.status,
                    "Refund needs manual attention"
                );
                self.event_sink.emit(make_event(
                    EventType::RefundFlagged,
                    booking.id,
                    Some(record.id),
                    record.failure_reason.clone(),
                ));
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adspace_core::payments::{MockPaymentGateway, RefundBehavior};
    use adspace_core::types::{BookingStatus, PricingQuote};
    use chrono::Duration;

    fn make_booking() -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            space_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            advertiser_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            start_date: now + Duration::days(10),
            end_date: now + Duration::days(40),
            status: BookingStatus::Paid,
            pricing: PricingQuote::new(50.0, 30, 100.0, 10.0),
            rejection_reason: None,
            cancellation_reason: None,
            status_before_dispute: None,
            completed_at: None,
            completed_with_refund: false,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    fn coordinator() -> (RefundCoordinator, Arc<MockPaymentGateway>) {
        let gateway = Arc::new(MockPaymentGateway::new());
        (RefundCoordinator::new(gateway.clone()), gateway)
    }

    #[test]
    fn test_full_refund_for_missed_window() {
        let (refunds, _gw) = coordinator();
        let booking = make_booking();
        let record = refunds
            .issue_refund(&booking, RefundTrigger::MissedInstallation, None)
            .unwrap();
        assert_eq!(record.status, RefundStatus::Issued);
        assert!((record.amount - 1750.0).abs() < f64::EPSILON);
        assert!(record.external_ref.is_some());
    }

    #[test]
    fn test_duplicate_trigger_is_deduplicated() {
        let (refunds, _gw) = coordinator();
        let booking = make_booking();

        let first = refunds
            .issue_refund(&booking, RefundTrigger::MissedInstallation, None)
            .unwrap();
        // Simulates a retried cancellation job delivering the same trigger.
        let second = refunds
            .issue_refund(&booking, RefundTrigger::MissedInstallation, None)
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(refunds.list_by_booking(booking.id).len(), 1);
    }

    #[test]
    fn test_distinct_triggers_are_distinct_instructions() {
        let (refunds, _gw) = coordinator();
        let booking = make_booking();
        refunds
            .issue_refund(&booking, RefundTrigger::MissedInstallation, None)
            .unwrap();
        refunds
            .issue_refund(&booking, RefundTrigger::DisputeSplit, Some(200.0))
            .unwrap();
        assert_eq!(refunds.list_by_booking(booking.id).len(), 2);
    }

    #[test]
    fn test_dispute_refund_requires_amount() {
        let (refunds, _gw) = coordinator();
        let booking = make_booking();
        assert!(matches!(
            refunds.issue_refund(&booking, RefundTrigger::DisputeUpheldAdvertiser, None),
            Err(MarketError::Validation(_))
        ));
        assert!(matches!(
            refunds.issue_refund(
                &booking,
                RefundTrigger::DisputeUpheldAdvertiser,
                Some(5000.0)
            ),
            Err(MarketError::Validation(_))
        ));
    }

    #[test]
    fn test_failed_reversal_recorded_not_retried() {
        let (refunds, gw) = coordinator();
        gw.script_refund(RefundBehavior::Fail("card network declined".into()));
        let booking = make_booking();

        let record = refunds
            .issue_refund(&booking, RefundTrigger::MissedInstallation, None)
            .unwrap();
        assert_eq!(record.status, RefundStatus::Failed);

        // Re-delivery returns the failed record untouched; no auto-retry.
        let again = refunds
            .issue_refund(&booking, RefundTrigger::MissedInstallation, None)
            .unwrap();
        assert_eq!(again.id, record.id);
        assert_eq!(again.status, RefundStatus::Failed);
    }

    #[test]
    fn test_ambiguous_outcome_parked_for_manual_review() {
        let (refunds, gw) = coordinator();
        gw.script_refund(RefundBehavior::Ambiguous("gateway timeout".into()));
        let booking = make_booking();

        let record = refunds
            .issue_refund(&booking, RefundTrigger::MissedInstallation, None)
            .unwrap();
        assert_eq!(record.status, RefundStatus::ManualReview);
        assert!(record.failure_reason.unwrap().contains("timeout"));
    }
}
