//! Dispute resolver — opens, tracks and resolves disputes, overriding
//! normal booking progression while one is pending.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use adspace_booking::BookingEngine;
use adspace_core::error::{MarketError, MarketResult};
use adspace_core::event_bus::{make_event, noop_sink, EventSink};
use adspace_core::types::{
    BookingStatus, Dispute, DisputeStatus, EventType, IssueType, RefundTrigger, ResolutionAction,
};
use adspace_escrow::{PayoutScheduler, RefundCoordinator};

/// Coordinates the dispute side-track: entering it, holding money, and
/// applying the administrator's resolution.
#[derive(Clone)]
pub struct DisputeResolver {
    disputes: Arc<DashMap<Uuid, Dispute>>,
    by_booking: Arc<DashMap<Uuid, Uuid>>,
    bookings: BookingEngine,
    payouts: PayoutScheduler,
    refunds: RefundCoordinator,
    event_sink: Arc<dyn EventSink>,
    grace_days: i64,
}

impl std::fmt::Debug for DisputeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisputeResolver")
            .field("disputes", &self.disputes.len())
            .field("grace_days", &self.grace_days)
            .finish()
    }
}

impl DisputeResolver {
    pub fn new(
        bookings: BookingEngine,
        payouts: PayoutScheduler,
        refunds: RefundCoordinator,
        grace_days: i64,
    ) -> Self {
        Self {
            disputes: Arc::new(DashMap::new()),
            by_booking: Arc::new(DashMap::new()),
            bookings,
            payouts,
            refunds,
            event_sink: noop_sink(),
            grace_days,
        }
    }

    /// Attach an event sink for emitting notification events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn get(&self, dispute_id: Uuid) -> MarketResult<Dispute> {
        self.disputes
            .get(&dispute_id)
            .map(|r| r.value().clone())
            .ok_or(MarketError::NotFound {
                entity: "dispute",
                id: dispute_id,
            })
    }

    pub fn get_by_booking(&self, booking_id: Uuid) -> Option<Dispute> {
        self.by_booking
            .get(&booking_id)
            .and_then(|id| self.disputes.get(id.value()))
            .map(|r| r.value().clone())
    }

    /// Open a dispute against a booking. Legal only once installation
    /// evidence exists (`Installed`, `Verified`) or after completion within
    /// the grace window. Puts the booking on the dispute side-track and
    /// holds all pending payouts.
    pub fn open_dispute(
        &self,
        booking_id: Uuid,
        issue_type: IssueType,
        reason: &str,
        evidence_photos: Vec<String>,
        now: DateTime<Utc>,
    ) -> MarketResult<Dispute> {
        if reason.trim().is_empty() {
            return Err(MarketError::Validation(
                "a dispute reason is required".into(),
            ));
        }
        if self.by_booking.contains_key(&booking_id) {
            return Err(MarketError::Validation(
                "a dispute already exists for this booking".into(),
            ));
        }

        let booking = self.bookings.get(booking_id)?;
        match booking.status {
            BookingStatus::Installed | BookingStatus::Verified => {}
            BookingStatus::Completed => {
                let completed_at = booking.completed_at.unwrap_or(booking.updated_at);
                if now > completed_at + Duration::days(self.grace_days) {
                    return Err(MarketError::Validation(format!(
                        "dispute grace period of {} day(s) after completion has expired",
                        self.grace_days
                    )));
                }
            }
            other => {
                return Err(MarketError::StateViolation {
                    from: other,
                    action: "open_dispute",
                })
            }
        }

        self.bookings.enter_dispute(booking_id)?;
        self.payouts.hold_for_dispute(booking_id);

        let dispute = Dispute {
            id: Uuid::new_v4(),
            booking_id,
            issue_type,
            reason: reason.to_string(),
            evidence_photos,
            disputed_at: now,
            status: DisputeStatus::Open,
            resolution_action: None,
            resolution_notes: None,
            resolved_at: None,
            version: 1,
        };
        self.by_booking.insert(booking_id, dispute.id);
        self.disputes.insert(dispute.id, dispute.clone());

        info!(
            dispute_id = %dispute.id,
            booking_id = %booking_id,
            ?issue_type,
            "Dispute opened"
        );
        self.event_sink.emit(make_event(
            EventType::DisputeOpened,
            booking_id,
            Some(dispute.id),
            Some(reason.to_string()),
        ));
        Ok(dispute)
    }

    /// Apply the administrator's resolution. Exactly one resolution per
    /// dispute; later calls fail with `AlreadyResolved`.
    pub fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        action: ResolutionAction,
        notes: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<Dispute> {
        let dispute = self.get(dispute_id)?;
        if dispute.status == DisputeStatus::Resolved {
            return Err(MarketError::AlreadyResolved(dispute_id));
        }

        let booking = self.bookings.get(dispute.booking_id)?;
        let prior = booking
            .status_before_dispute
            .unwrap_or(BookingStatus::Installed);

        match action {
            ResolutionAction::UpholdOwner => {
                self.bookings
                    .exit_dispute(booking.id, prior, false, None)?;
                self.payouts.release_hold(booking.id);
                let restored = self.bookings.get(booking.id)?;
                for result in self.payouts.release_due_stages(&restored) {
                    // Payment failures are recorded on the payout; they must
                    // not undo the resolution itself.
                    let _ = result;
                }
            }
            ResolutionAction::UpholdAdvertiser => {
                self.refunds.issue_refund(
                    &booking,
                    RefundTrigger::DisputeUpheldAdvertiser,
                    Some(booking.pricing.total_amount),
                )?;
                if prior == BookingStatus::Completed {
                    self.bookings
                        .exit_dispute(booking.id, BookingStatus::Completed, true, None)?;
                } else {
                    self.bookings.exit_dispute(
                        booking.id,
                        BookingStatus::Cancelled,
                        false,
                        Some("dispute resolved in advertiser's favor"),
                    )?;
                }
            }
            ResolutionAction::Split { refund_amount } => {
                if refund_amount <= 0.0 || refund_amount >= booking.pricing.total_amount {
                    return Err(MarketError::Validation(format!(
                        "split refund must be between 0 and {:.2}",
                        booking.pricing.total_amount
                    )));
                }
                self.refunds.issue_refund(
                    &booking,
                    RefundTrigger::DisputeSplit,
                    Some(refund_amount),
                )?;
                let completed_with_refund = prior == BookingStatus::Completed;
                self.bookings
                    .exit_dispute(booking.id, prior, completed_with_refund, None)?;
                self.payouts.release_hold(booking.id);
                let restored = self.bookings.get(booking.id)?;
                for result in self.payouts.release_due_stages(&restored) {
                    let _ = result;
                }
            }
        }

        let mut entry = self
            .disputes
            .get_mut(&dispute_id)
            .ok_or(MarketError::NotFound {
                entity: "dispute",
                id: dispute_id,
            })?;
        let d = entry.value_mut();
        d.status = DisputeStatus::Resolved;
        d.resolution_action = Some(action);
        d.resolution_notes = Some(notes.to_string());
        d.resolved_at = Some(now);
        d.version += 1;
        let resolved = d.clone();
        drop(entry);

        info!(
            dispute_id = %dispute_id,
            booking_id = %resolved.booking_id,
            ?action,
            "Dispute resolved"
        );
        self.event_sink.emit(make_event(
            EventType::DisputeResolved,
            resolved.booking_id,
            Some(dispute_id),
            Some(notes.to_string()),
        ));
        Ok(resolved)
    }
}
