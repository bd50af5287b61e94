//! Deadline sweep — the marketplace keeps no timers. All wall-clock
//! deadlines (missed installation windows, proof auto-approval, campaign
//! completion) are enforced lazily by this runner, driven on a schedule or
//! on demand.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use adspace_booking::{BookingEngine, WindowPhase};
use adspace_core::types::{BookingStatus, RefundTrigger};
use adspace_escrow::{PayoutScheduler, RefundCoordinator};
use adspace_verification::ProofEngine;

/// Outcome of one sweep pass. Lists the bookings acted on this pass, so
/// an immediate re-run reports everything empty.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub cancelled: Vec<Uuid>,
    pub auto_approved: Vec<Uuid>,
    pub completed: Vec<Uuid>,
    pub payouts_released: Vec<Uuid>,
    pub errors: Vec<String>,
}

/// Runs the deadline phases in order. Each booking is handled
/// independently; one failure is recorded and never aborts the pass.
#[derive(Clone, Debug)]
pub struct SweepRunner {
    bookings: BookingEngine,
    proofs: ProofEngine,
    payouts: PayoutScheduler,
    refunds: RefundCoordinator,
}

impl SweepRunner {
    pub fn new(
        bookings: BookingEngine,
        proofs: ProofEngine,
        payouts: PayoutScheduler,
        refunds: RefundCoordinator,
    ) -> Self {
        Self {
            bookings,
            proofs,
            payouts,
            refunds,
        }
    }

    pub fn run(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        self.cancel_missed_windows(now, &mut report);
        self.auto_approve_proofs(now, &mut report);
        self.complete_ended_campaigns(now, &mut report);
        info!(
            cancelled = report.cancelled.len(),
            auto_approved = report.auto_approved.len(),
            completed = report.completed.len(),
            payouts_released = report.payouts_released.len(),
            errors = report.errors.len(),
            "Sweep pass finished"
        );
        report
    }

    /// Paid bookings whose installation window closed without the owner
    /// marking installation are cancelled and refunded in full.
    fn cancel_missed_windows(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let mut candidates = self.bookings.list_by_status(BookingStatus::Paid);
        candidates.extend(self.bookings.list_by_status(BookingStatus::FileDownloaded));

        for booking in candidates {
            let status = match self.bookings.window_status(booking.id, now) {
                Ok(s) => s,
                Err(e) => {
                    report.errors.push(format!("window {}: {}", booking.id, e));
                    continue;
                }
            };
            if status.phase != WindowPhase::Closed {
                continue;
            }
            match self
                .bookings
                .cancel_booking(booking.id, "installation window missed")
            {
                Ok(cancelled) => {
                    report.cancelled.push(cancelled.id);
                    if let Err(e) =
                        self.refunds
                            .issue_refund(&cancelled, RefundTrigger::MissedInstallation, None)
                    {
                        warn!(booking_id = %booking.id, error = %e, "Missed-window refund failed");
                        report.errors.push(format!("refund {}: {}", booking.id, e));
                    }
                }
                Err(e) => {
                    report.errors.push(format!("cancel {}: {}", booking.id, e));
                }
            }
        }
    }

    /// Pending proofs past their review deadline auto-approve, which also
    /// makes the install-stage payout due.
    fn auto_approve_proofs(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        for proof in self.proofs.sweep_auto_approvals(now) {
            report.auto_approved.push(proof.booking_id);
            match self.bookings.get(proof.booking_id) {
                Ok(booking) => match self.payouts.release_install_stage(&booking) {
                    Ok(payout) => report.payouts_released.push(payout.id),
                    Err(e) => report
                        .errors
                        .push(format!("install payout {}: {}", booking.id, e)),
                },
                Err(e) => report.errors.push(format!("booking {}: {}", proof.booking_id, e)),
            }
        }
    }

    /// Verified bookings past their campaign end date complete, releasing
    /// the rental-stage payout. Disputed bookings are untouched; they
    /// complete on a later pass once the dispute resolves.
    fn complete_ended_campaigns(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        for booking in self.bookings.list_by_status(BookingStatus::Verified) {
            if now <= booking.end_date {
                continue;
            }
            match self.bookings.complete_booking(booking.id, now) {
                Ok(completed) => {
                    report.completed.push(completed.id);
                    match self.payouts.release_rental_stage(&completed) {
                        Ok(payout) => report.payouts_released.push(payout.id),
                        Err(e) => report
                            .errors
                            .push(format!("rental payout {}: {}", booking.id, e)),
                    }
                }
                Err(e) => {
                    report.errors.push(format!("complete {}: {}", booking.id, e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use uuid::Uuid;

    use adspace_booking::{BookingStore, CreateBookingRequest};
    use adspace_core::payments::MockPaymentGateway;
    use adspace_core::types::{PayoutStage, PayoutStatus, ProofStatus, RefundStatus};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    struct Fixture {
        bookings: BookingEngine,
        proofs: ProofEngine,
        payouts: PayoutScheduler,
        refunds: RefundCoordinator,
        runner: SweepRunner,
    }

    fn fixture() -> Fixture {
        let bookings = BookingEngine::new(Arc::new(BookingStore::new()), 7);
        let proofs = ProofEngine::new(bookings.clone(), 48);
        let gateway = Arc::new(MockPaymentGateway::new());
        let payouts = PayoutScheduler::new(gateway.clone());
        let refunds = RefundCoordinator::new(gateway);
        let runner = SweepRunner::new(
            bookings.clone(),
            proofs.clone(),
            payouts.clone(),
            refunds.clone(),
        );
        Fixture {
            bookings,
            proofs,
            payouts,
            refunds,
            runner,
        }
    }

    fn paid_booking(f: &Fixture, start: DateTime<Utc>, end: DateTime<Utc>) -> Uuid {
        let booking = f
            .bookings
            .create_booking(CreateBookingRequest {
                space_id: Uuid::new_v4(),
                campaign_id: Uuid::new_v4(),
                advertiser_id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                start_date: start,
                end_date: end,
                price_per_day: 50.0,
                installation_fee: 100.0,
                platform_fee_percent: 10.0,
            })
            .unwrap();
        f.bookings.approve_booking(booking.id).unwrap();
        f.bookings.confirm_payment(booking.id).unwrap();
        booking.id
    }

    #[test]
    fn test_missed_window_cancelled_and_refunded() {
        let f = fixture();
        let id = paid_booking(&f, utc(2026, 3, 1, 0), utc(2026, 3, 30, 0));

        // Window still open: nothing happens.
        let report = f.runner.run(utc(2026, 3, 5, 0));
        assert!(report.cancelled.is_empty());

        // Window closed (campaign start + 8 days): cancel plus full refund.
        let report = f.runner.run(utc(2026, 3, 12, 0));
        assert_eq!(report.cancelled, vec![id]);
        assert!(report.errors.is_empty());
        assert_eq!(
            f.bookings.get(id).unwrap().status,
            BookingStatus::Cancelled
        );
        let refunds = f.refunds.list_by_booking(id);
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].status, RefundStatus::Issued);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let f = fixture();
        let id = paid_booking(&f, utc(2026, 3, 1, 0), utc(2026, 3, 30, 0));

        let first = f.runner.run(utc(2026, 3, 12, 0));
        assert_eq!(first.cancelled, vec![id]);

        // Re-running takes no further action and issues no second refund.
        let second = f.runner.run(utc(2026, 3, 12, 1));
        assert!(second.cancelled.is_empty());
        assert!(second.errors.is_empty());
        assert_eq!(f.refunds.list_by_booking(id).len(), 1);
    }

    #[test]
    fn test_auto_approval_releases_install_payout() {
        let f = fixture();
        let id = paid_booking(&f, utc(2026, 3, 1, 0), utc(2026, 3, 30, 0));
        f.bookings.mark_file_downloaded(id).unwrap();
        f.bookings.mark_installed(id, utc(2026, 3, 1, 9)).unwrap();
        f.proofs
            .submit_proof(id, vec!["front.jpg".into()], utc(2026, 3, 1, 10))
            .unwrap();

        // Before the 48h deadline: untouched.
        let report = f.runner.run(utc(2026, 3, 2, 10));
        assert!(report.auto_approved.is_empty());

        let report = f.runner.run(utc(2026, 3, 3, 11));
        assert_eq!(report.auto_approved, vec![id]);
        assert_eq!(report.payouts_released.len(), 1);
        assert_eq!(
            f.proofs.get_by_booking(id).unwrap().status,
            ProofStatus::Approved
        );
        assert_eq!(f.bookings.get(id).unwrap().status, BookingStatus::Verified);
        let payouts = f.payouts.list_by_booking(id);
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].stage, PayoutStage::Install);
        assert_eq!(payouts[0].status, PayoutStatus::Completed);
    }

    #[test]
    fn test_ended_campaign_completes_with_rental_payout() {
        let f = fixture();
        let id = paid_booking(&f, utc(2026, 3, 1, 0), utc(2026, 3, 30, 0));
        f.bookings.mark_file_downloaded(id).unwrap();
        f.bookings.mark_installed(id, utc(2026, 3, 1, 9)).unwrap();
        f.proofs
            .submit_proof(id, vec!["front.jpg".into()], utc(2026, 3, 1, 10))
            .unwrap();
        f.proofs
            .get_by_booking(id)
            .map(|p| f.proofs.approve_proof(p.id, utc(2026, 3, 2, 0)).unwrap())
            .unwrap();
        f.payouts
            .release_install_stage(&f.bookings.get(id).unwrap())
            .unwrap();

        // Campaign still running: not completed.
        let report = f.runner.run(utc(2026, 3, 20, 0));
        assert!(report.completed.is_empty());

        let report = f.runner.run(utc(2026, 3, 31, 0));
        assert_eq!(report.completed, vec![id]);
        assert_eq!(report.payouts_released.len(), 1);
        assert_eq!(f.bookings.get(id).unwrap().status, BookingStatus::Completed);
        let payouts = f.payouts.list_by_booking(id);
        assert_eq!(payouts.len(), 2);
    }
}
