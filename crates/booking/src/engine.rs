//! Booking lifecycle engine — owns the status graph for a booking from
//! creation through completion, cancellation, or dispute.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use adspace_core::error::{MarketError, MarketResult};
use adspace_core::event_bus::{make_event, noop_sink, EventSink};
use adspace_core::types::{Booking, BookingStatus, EventType, PricingQuote};

use crate::state_machine::BookingStateMachine;
use crate::store::BookingStore;
use crate::window::{self, WindowPhase, WindowStatus};

/// Request to create a booking, produced by the external approval flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub space_id: Uuid,
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub owner_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub price_per_day: f64,
    pub installation_fee: f64,
    pub platform_fee_percent: f64,
}

/// Core booking engine over the in-memory store.
#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<BookingStore>,
    machine: BookingStateMachine,
    event_sink: Arc<dyn EventSink>,
    window_days: i64,
}

impl std::fmt::Debug for BookingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingEngine")
            .field("window_days", &self.window_days)
            .finish()
    }
}

impl BookingEngine {
    pub fn new(store: Arc<BookingStore>, window_days: i64) -> Self {
        Self {
            store,
            machine: BookingStateMachine::new(),
            event_sink: noop_sink(),
            window_days,
        }
    }

    /// Attach an event sink for emitting notification events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn store(&self) -> &Arc<BookingStore> {
        &self.store
    }

    pub fn get(&self, id: Uuid) -> MarketResult<Booking> {
        self.store.get(id)
    }

    pub fn list(&self) -> Vec<Booking> {
        self.store.list()
    }

    pub fn list_by_status(&self, status: BookingStatus) -> Vec<Booking> {
        self.store.list_by_status(status)
    }

    /// Create a booking in `PendingApproval` with its pricing computed once.
    pub fn create_booking(&self, req: CreateBookingRequest) -> MarketResult<Booking> {
        if req.end_date < req.start_date {
            return Err(MarketError::Validation(
                "end_date must not precede start_date".into(),
            ));
        }
        if req.price_per_day <= 0.0 {
            return Err(MarketError::Validation(
                "price_per_day must be positive".into(),
            ));
        }
        if req.installation_fee < 0.0 || req.platform_fee_percent < 0.0 {
            return Err(MarketError::Validation(
                "fees must be non-negative".into(),
            ));
        }

        let total_days = (req.end_date - req.start_date).num_days() as u32 + 1;
        let pricing = PricingQuote::new(
            req.price_per_day,
            total_days,
            req.installation_fee,
            req.platform_fee_percent,
        );

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            space_id: req.space_id,
            campaign_id: req.campaign_id,
            advertiser_id: req.advertiser_id,
            owner_id: req.owner_id,
            start_date: req.start_date,
            end_date: req.end_date,
            status: BookingStatus::PendingApproval,
            pricing,
            rejection_reason: None,
            cancellation_reason: None,
            status_before_dispute: None,
            completed_at: None,
            completed_with_refund: false,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        info!(
            booking_id = %booking.id,
            space_id = %booking.space_id,
            total = booking.pricing.total_amount,
            "Booking created"
        );
        self.store.insert(booking.clone());
        self.event_sink
            .emit(make_event(EventType::BookingCreated, booking.id, None, None));
        Ok(booking)
    }

    /// Owner accepts the booking request.
    pub fn approve_booking(&self, id: Uuid) -> MarketResult<Booking> {
        let booking = self.transition(id, BookingStatus::Approved, "approve_booking", |_| Ok(()))?;
        self.event_sink
            .emit(make_event(EventType::BookingApproved, id, None, None));
        Ok(booking)
    }

    /// Owner declines the booking request; a reason is required.
    pub fn reject_booking(&self, id: Uuid, reason: &str) -> MarketResult<Booking> {
        if reason.trim().is_empty() {
            return Err(MarketError::Validation(
                "a rejection reason is required".into(),
            ));
        }
        let booking = self.transition(id, BookingStatus::Rejected, "reject_booking", |b| {
            b.rejection_reason = Some(reason.to_string());
            Ok(())
        })?;
        self.event_sink.emit(make_event(
            EventType::BookingRejected,
            id,
            None,
            Some(reason.to_string()),
        ));
        Ok(booking)
    }

    /// External payment capture confirmed; funds are now held in escrow.
    pub fn confirm_payment(&self, id: Uuid) -> MarketResult<Booking> {
        let booking = self.transition(id, BookingStatus::Paid, "confirm_payment", |_| Ok(()))?;
        self.event_sink
            .emit(make_event(EventType::PaymentConfirmed, id, None, None));
        Ok(booking)
    }

    /// Owner marks the creative file downloaded.
    pub fn mark_file_downloaded(&self, id: Uuid) -> MarketResult<Booking> {
        let booking =
            self.transition(id, BookingStatus::FileDownloaded, "mark_file_downloaded", |_| {
                Ok(())
            })?;
        self.event_sink
            .emit(make_event(EventType::FileDownloaded, id, None, None));
        Ok(booking)
    }

    /// Owner marks physical installation complete. Only legal while the
    /// installation window is open; a missed window routes to cancellation
    /// via the scheduled sweep instead.
    pub fn mark_installed(&self, id: Uuid, now: DateTime<Utc>) -> MarketResult<Booking> {
        let window_days = self.window_days;
        let booking = self.transition(id, BookingStatus::Installed, "mark_installed", |b| {
            let status = window::compute_window_status(b.start_date, now, window_days);
            match status.phase {
                WindowPhase::Open => Ok(()),
                WindowPhase::TooEarly => Err(MarketError::WindowNotOpen {
                    booking_id: b.id,
                    days_until_open: status.days_until_open.unwrap_or(0),
                }),
                WindowPhase::Closed => Err(MarketError::WindowClosed {
                    booking_id: b.id,
                    days_since_closed: status.days_since_closed.unwrap_or(0),
                }),
            }
        })?;
        self.event_sink
            .emit(make_event(EventType::BookingInstalled, id, None, None));
        Ok(booking)
    }

    /// Proof approved; booking advances to `Verified`. Driven by the proof
    /// verification engine.
    pub fn mark_verified(&self, id: Uuid) -> MarketResult<Booking> {
        let booking = self.transition(id, BookingStatus::Verified, "mark_verified", |_| Ok(()))?;
        self.event_sink
            .emit(make_event(EventType::BookingVerified, id, None, None));
        Ok(booking)
    }

    /// Campaign end date has passed with no blocking dispute; the booking
    /// completes and the rental payout becomes releasable.
    pub fn complete_booking(&self, id: Uuid, now: DateTime<Utc>) -> MarketResult<Booking> {
        let booking = self.transition(id, BookingStatus::Completed, "complete_booking", |b| {
            if now <= b.end_date {
                return Err(MarketError::Validation(format!(
                    "campaign runs until {}, cannot complete yet",
                    b.end_date
                )));
            }
            b.completed_at = Some(now);
            Ok(())
        })?;
        self.event_sink
            .emit(make_event(EventType::BookingCompleted, id, None, None));
        Ok(booking)
    }

    /// Administrative or automatic cancellation. Legal only before
    /// installation; always paired with a refund decision by the caller.
    pub fn cancel_booking(&self, id: Uuid, reason: &str) -> MarketResult<Booking> {
        let booking = self.transition(id, BookingStatus::Cancelled, "cancel_booking", |b| {
            b.cancellation_reason = Some(reason.to_string());
            Ok(())
        })?;
        self.event_sink.emit(make_event(
            EventType::BookingCancelled,
            id,
            None,
            Some(reason.to_string()),
        ));
        Ok(booking)
    }

    /// Enter the dispute side-track, remembering the prior status so an
    /// uphold-owner resolution can resume normal progression.
    pub fn enter_dispute(&self, id: Uuid) -> MarketResult<Booking> {
        self.transition(id, BookingStatus::Disputed, "open_dispute", |b| {
            b.status_before_dispute = Some(b.status);
            Ok(())
        })
    }

    /// Leave the dispute side-track into `to` (one of the legal resolution
    /// targets). `completed_with_refund` marks a refunded-but-completed
    /// booking; `reason` is recorded on cancellations.
    pub fn exit_dispute(
        &self,
        id: Uuid,
        to: BookingStatus,
        completed_with_refund: bool,
        reason: Option<&str>,
    ) -> MarketResult<Booking> {
        self.transition(id, to, "resolve_dispute", |b| {
            b.status_before_dispute = None;
            b.completed_with_refund = completed_with_refund;
            if to == BookingStatus::Cancelled {
                b.cancellation_reason = reason.map(|r| r.to_string());
            }
            Ok(())
        })
    }

    /// Pure, read-only window query for a booking.
    pub fn window_status(&self, id: Uuid, now: DateTime<Utc>) -> MarketResult<WindowStatus> {
        let booking = self.store.get(id)?;
        Ok(window::compute_window_status(
            booking.start_date,
            now,
            self.window_days,
        ))
    }

    /// Seed a handful of demo bookings at different lifecycle points, for
    /// local development against an empty store.
    pub fn seed_demo_bookings(&self) {
        info!("Seeding demo bookings");

        let now = Utc::now();

        // 1. Fresh request awaiting the owner's decision.
        let _ = self.create_booking(CreateBookingRequest {
            space_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            advertiser_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            start_date: now + Duration::days(21),
            end_date: now + Duration::days(51),
            price_per_day: 45.0,
            installation_fee: 120.0,
            platform_fee_percent: 10.0,
        });

        // 2. Paid booking with its installation window currently open.
        if let Ok(paid) = self.create_booking(CreateBookingRequest {
            space_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            advertiser_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            start_date: now + Duration::days(2),
            end_date: now + Duration::days(32),
            price_per_day: 80.0,
            installation_fee: 150.0,
            platform_fee_percent: 10.0,
        }) {
            let _ = self.approve_booking(paid.id);
            let _ = self.confirm_payment(paid.id);
            let _ = self.mark_file_downloaded(paid.id);
        }

        // 3. Installed booking awaiting proof review.
        if let Ok(installed) = self.create_booking(CreateBookingRequest {
            space_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            advertiser_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(29),
            price_per_day: 60.0,
            installation_fee: 100.0,
            platform_fee_percent: 10.0,
        }) {
            let _ = self.approve_booking(installed.id);
            let _ = self.confirm_payment(installed.id);
            let _ = self.mark_file_downloaded(installed.id);
            let _ = self.mark_installed(installed.id, now);
        }

        info!(count = self.store.list().len(), "Demo bookings seeded");
    }

    /// Single atomic transition: legality check and extra guard both run
    /// under the store's entry lock, so either everything applies or the
    /// booking is untouched.
    fn transition(
        &self,
        id: Uuid,
        to: BookingStatus,
        action: &'static str,
        extra: impl FnOnce(&mut Booking) -> MarketResult<()>,
    ) -> MarketResult<Booking> {
        let machine = &self.machine;
        let updated = self.store.update(id, |b| {
            machine.assert_transition(b.status, to, action)?;
            extra(b)?;
            let from = b.status;
            b.status = to;
            info!(booking_id = %b.id, ?from, ?to, action, "Booking transition");
            Ok(b.clone())
        })?;
        // `update` bumped the version after the closure ran; re-read for the
        // caller-visible record.
        self.store.get(updated.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn engine() -> BookingEngine {
        BookingEngine::new(Arc::new(BookingStore::new()), 7)
    }

    fn request(start: DateTime<Utc>, end: DateTime<Utc>) -> CreateBookingRequest {
        CreateBookingRequest {
            space_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            advertiser_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            start_date: start,
            end_date: end,
            price_per_day: 50.0,
            installation_fee: 100.0,
            platform_fee_percent: 10.0,
        }
    }

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn advance_to_file_downloaded(engine: &BookingEngine, id: Uuid) {
        engine.approve_booking(id).unwrap();
        engine.confirm_payment(id).unwrap();
        engine.mark_file_downloaded(id).unwrap();
    }

    #[test]
    fn test_create_computes_pricing() {
        let e = engine();
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        assert_eq!(booking.status, BookingStatus::PendingApproval);
        assert_eq!(booking.pricing.total_days, 30);
        assert!((booking.pricing.total_amount - 1750.0).abs() < 1e-9);
    }

    #[test]
    fn test_create_rejects_inverted_dates() {
        let e = engine();
        let err = e
            .create_booking(request(utc(2026, 3, 30), utc(2026, 3, 1)))
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[test]
    fn test_reject_requires_reason() {
        let e = engine();
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        assert!(matches!(
            e.reject_booking(booking.id, "  "),
            Err(MarketError::Validation(_))
        ));
        let rejected = e.reject_booking(booking.id, "space no longer available").unwrap();
        assert_eq!(rejected.status, BookingStatus::Rejected);
        assert!(rejected.rejection_reason.is_some());
    }

    #[test]
    fn test_illegal_transition_makes_no_mutation() {
        let e = engine();
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        // Payment before approval is illegal.
        let err = e.confirm_payment(booking.id).unwrap_err();
        assert!(matches!(err, MarketError::StateViolation { .. }));
        let reloaded = e.get(booking.id).unwrap();
        assert_eq!(reloaded.status, BookingStatus::PendingApproval);
        assert_eq!(reloaded.version, booking.version);
    }

    #[test]
    fn test_mark_installed_inside_window() {
        let e = engine();
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        advance_to_file_downloaded(&e, booking.id);

        let installed = e.mark_installed(booking.id, utc(2026, 2, 25)).unwrap();
        assert_eq!(installed.status, BookingStatus::Installed);
    }

    #[test]
    fn test_mark_installed_after_window_closed() {
        let e = engine();
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        advance_to_file_downloaded(&e, booking.id);

        let err = e.mark_installed(booking.id, utc(2026, 3, 20)).unwrap_err();
        assert!(matches!(err, MarketError::WindowClosed { .. }));
        // Status unchanged.
        assert_eq!(
            e.get(booking.id).unwrap().status,
            BookingStatus::FileDownloaded
        );
    }

    #[test]
    fn test_mark_installed_too_early() {
        let e = engine();
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        advance_to_file_downloaded(&e, booking.id);

        let err = e.mark_installed(booking.id, utc(2026, 2, 1)).unwrap_err();
        assert!(matches!(err, MarketError::WindowNotOpen { .. }));
        assert_eq!(
            e.get(booking.id).unwrap().status,
            BookingStatus::FileDownloaded
        );
    }

    #[test]
    fn test_complete_requires_end_date_passed() {
        let e = engine();
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        advance_to_file_downloaded(&e, booking.id);
        e.mark_installed(booking.id, utc(2026, 3, 1)).unwrap();
        e.mark_verified(booking.id).unwrap();

        assert!(e.complete_booking(booking.id, utc(2026, 3, 15)).is_err());
        let completed = e.complete_booking(booking.id, utc(2026, 3, 31)).unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(completed.completed_at, Some(utc(2026, 3, 31)));
    }

    #[test]
    fn test_cancel_only_pre_installation() {
        let e = engine();
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        advance_to_file_downloaded(&e, booking.id);
        e.mark_installed(booking.id, utc(2026, 3, 1)).unwrap();

        let err = e.cancel_booking(booking.id, "missed window").unwrap_err();
        assert!(matches!(err, MarketError::StateViolation { .. }));
    }

    #[test]
    fn test_dispute_round_trip_restores_status() {
        let e = engine();
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        advance_to_file_downloaded(&e, booking.id);
        e.mark_installed(booking.id, utc(2026, 3, 1)).unwrap();
        e.mark_verified(booking.id).unwrap();

        let disputed = e.enter_dispute(booking.id).unwrap();
        assert_eq!(disputed.status, BookingStatus::Disputed);
        assert_eq!(
            disputed.status_before_dispute,
            Some(BookingStatus::Verified)
        );

        let restored = e
            .exit_dispute(booking.id, BookingStatus::Verified, false, None)
            .unwrap();
        assert_eq!(restored.status, BookingStatus::Verified);
        assert!(restored.status_before_dispute.is_none());
    }

    #[test]
    fn test_transitions_emit_events() {
        use adspace_core::event_bus::capture_sink;
        use adspace_core::types::EventType;

        let sink = capture_sink();
        let e = engine().with_event_sink(sink.clone());
        let booking = e
            .create_booking(request(utc(2026, 3, 1), utc(2026, 3, 30)))
            .unwrap();
        e.approve_booking(booking.id).unwrap();
        e.confirm_payment(booking.id).unwrap();

        assert_eq!(sink.count_type(EventType::BookingCreated), 1);
        assert_eq!(sink.count_type(EventType::BookingApproved), 1);
        assert_eq!(sink.count_type(EventType::PaymentConfirmed), 1);

        // A failed transition emits nothing.
        sink.clear();
        assert!(e.approve_booking(booking.id).is_err());
        assert_eq!(sink.count(), 0);
    }
}
