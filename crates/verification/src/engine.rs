//! Proof verification engine — submission of installation-proof photos,
//! advertiser accept/reject decisions, and the 48-hour auto-approval rule.
//!
//! Auto-approval is a wall-clock deadline evaluated lazily by the scheduled
//! sweep, never an in-process timer.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use adspace_booking::BookingEngine;
use adspace_core::error::{MarketError, MarketResult};
use adspace_core::event_bus::{make_event, noop_sink, EventSink};
use adspace_core::types::{BookingStatus, EventType, Proof, ProofStatus};

/// Manages the 1:1 proof attached to each installed booking.
#[derive(Clone)]
pub struct ProofEngine {
    proofs: Arc<DashMap<Uuid, Proof>>,
    by_booking: Arc<DashMap<Uuid, Uuid>>,
    bookings: BookingEngine,
    event_sink: Arc<dyn EventSink>,
    auto_approve_hours: i64,
}

impl std::fmt::Debug for ProofEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofEngine")
            .field("proofs", &self.proofs.len())
            .field("auto_approve_hours", &self.auto_approve_hours)
            .finish()
    }
}

impl ProofEngine {
    pub fn new(bookings: BookingEngine, auto_approve_hours: i64) -> Self {
        Self {
            proofs: Arc::new(DashMap::new()),
            by_booking: Arc::new(DashMap::new()),
            bookings,
            event_sink: noop_sink(),
            auto_approve_hours,
        }
    }

    /// Attach an event sink for emitting notification events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn get(&self, proof_id: Uuid) -> MarketResult<Proof> {
        self.proofs
            .get(&proof_id)
            .map(|r| r.value().clone())
            .ok_or(MarketError::NotFound {
                entity: "proof",
                id: proof_id,
            })
    }

    pub fn get_by_booking(&self, booking_id: Uuid) -> Option<Proof> {
        self.by_booking
            .get(&booking_id)
            .and_then(|id| self.proofs.get(id.value()))
            .map(|r| r.value().clone())
    }

    /// Submit (or resubmit) installation-proof photos for a booking.
    ///
    /// The booking must be `Installed` and at least one photo is required.
    /// Resubmission replaces the photos and resets the submission and
    /// auto-approval clocks, but only while the proof is not yet approved.
    pub fn submit_proof(
        &self,
        booking_id: Uuid,
        photos: Vec<String>,
        now: DateTime<Utc>,
    ) -> MarketResult<Proof> {
        if photos.is_empty() {
            return Err(MarketError::Validation(
                "at least one photo is required".into(),
            ));
        }

        let booking = self.bookings.get(booking_id)?;
        if booking.status != BookingStatus::Installed {
            return Err(MarketError::StateViolation {
                from: booking.status,
                action: "submit_proof",
            });
        }

        let auto_approve_at = now + Duration::hours(self.auto_approve_hours);

        if let Some(existing_id) = self.by_booking.get(&booking_id).map(|r| *r.value()) {
            let mut entry = self
                .proofs
                .get_mut(&existing_id)
                .ok_or(MarketError::NotFound {
                    entity: "proof",
                    id: existing_id,
                })?;
            if entry.status == ProofStatus::Approved {
                return Err(MarketError::Validation(
                    "proof already approved; resubmission not allowed".into(),
                ));
            }
            let proof = entry.value_mut();
            proof.photos = photos;
            proof.status = ProofStatus::Pending;
            proof.rejection_reason = None;
            proof.submitted_at = now;
            proof.auto_approve_at = auto_approve_at;
            proof.updated_at = now;
            proof.version += 1;
            let updated = proof.clone();
            drop(entry);

            info!(booking_id = %booking_id, proof_id = %updated.id, "Proof resubmitted");
            self.event_sink.emit(make_event(
                EventType::ProofSubmitted,
                booking_id,
                Some(updated.id),
                Some("resubmission".into()),
            ));
            return Ok(updated);
        }

        let proof = Proof {
            id: Uuid::new_v4(),
            booking_id,
            status: ProofStatus::Pending,
            photos,
            submitted_at: now,
            auto_approve_at,
            rejection_reason: None,
            updated_at: now,
            version: 1,
        };
        self.by_booking.insert(booking_id, proof.id);
        self.proofs.insert(proof.id, proof.clone());

        info!(booking_id = %booking_id, proof_id = %proof.id, "Proof submitted");
        self.event_sink.emit(make_event(
            EventType::ProofSubmitted,
            booking_id,
            Some(proof.id),
            None,
        ));
        Ok(proof)
    }

    /// Advertiser approves the proof. Drives the booking to `Verified` and
    /// emits the event the payout scheduler reacts to. Approving an
    /// already-approved proof is a no-op.
    pub fn approve_proof(&self, proof_id: Uuid, now: DateTime<Utc>) -> MarketResult<Proof> {
        self.approve_internal(proof_id, now, "advertiser")
    }

    /// Advertiser rejects the proof. Only legal while the proof is pending
    /// and before the auto-approval deadline. The booking stays `Installed`;
    /// the advertiser's path forward is resubmission or a dispute.
    pub fn reject_proof(
        &self,
        proof_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<Proof> {
        if reason.trim().is_empty() {
            return Err(MarketError::Validation(
                "a rejection reason is required".into(),
            ));
        }

        let mut entry = self.proofs.get_mut(&proof_id).ok_or(MarketError::NotFound {
            entity: "proof",
            id: proof_id,
        })?;
        match entry.status {
            ProofStatus::Pending => {}
            ProofStatus::Approved => {
                return Err(MarketError::Validation(
                    "proof already approved; open a dispute instead".into(),
                ))
            }
            ProofStatus::Rejected => {
                return Err(MarketError::Validation("proof already rejected".into()))
            }
        }
        if now >= entry.auto_approve_at {
            return Err(MarketError::Validation(
                "auto-approval deadline has passed".into(),
            ));
        }

        let proof = entry.value_mut();
        proof.status = ProofStatus::Rejected;
        proof.rejection_reason = Some(reason.to_string());
        proof.updated_at = now;
        proof.version += 1;
        let updated = proof.clone();
        drop(entry);

        info!(proof_id = %proof_id, booking_id = %updated.booking_id, "Proof rejected");
        self.event_sink.emit(make_event(
            EventType::ProofRejected,
            updated.booking_id,
            Some(proof_id),
            Some(reason.to_string()),
        ));
        Ok(updated)
    }

    /// Approve every pending proof whose auto-approval deadline has passed.
    /// Returns the proofs approved in this pass. Already-rejected and
    /// already-approved proofs are never touched, so re-running is a no-op.
    pub fn sweep_auto_approvals(&self, now: DateTime<Utc>) -> Vec<Proof> {
        let due: Vec<Uuid> = self
            .proofs
            .iter()
            .filter(|r| r.status == ProofStatus::Pending && now >= r.auto_approve_at)
            .map(|r| r.id)
            .collect();

        let mut approved = Vec::new();
        for proof_id in due {
            match self.approve_internal(proof_id, now, "auto") {
                Ok(proof) => approved.push(proof),
                // A disputed booking blocks verification; the proof stays
                // pending and the next sweep retries after resolution.
                Err(e) => {
                    warn!(proof_id = %proof_id, error = %e, "Auto-approval skipped")
                }
            }
        }
        approved
    }

    fn approve_internal(
        &self,
        proof_id: Uuid,
        now: DateTime<Utc>,
        actor: &str,
    ) -> MarketResult<Proof> {
        // Status check and write happen under one entry lock; a concurrent
        // rejection serializes before or after the whole approval, never in
        // between.
        let mut entry = self.proofs.get_mut(&proof_id).ok_or(MarketError::NotFound {
            entity: "proof",
            id: proof_id,
        })?;
        match entry.status {
            ProofStatus::Approved => return Ok(entry.value().clone()),
            ProofStatus::Rejected => {
                return Err(MarketError::Validation(
                    "proof was rejected; approval requires resubmission".into(),
                ))
            }
            ProofStatus::Pending => {}
        }

        // Advance the booking first; if that fails the proof stays pending.
        self.bookings.mark_verified(entry.booking_id)?;

        let proof = entry.value_mut();
        proof.status = ProofStatus::Approved;
        proof.updated_at = now;
        proof.version += 1;
        let updated = proof.clone();
        drop(entry);

        info!(proof_id = %proof_id, booking_id = %updated.booking_id, actor, "Proof approved");
        self.event_sink.emit(make_event(
            EventType::ProofApproved,
            updated.booking_id,
            Some(proof_id),
            Some(actor.to_string()),
        ));
        Ok(updated)
    }
}
