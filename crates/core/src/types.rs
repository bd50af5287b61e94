//! Shared domain types for the AdSpace Exchange booking core.
//!
//! Every entity carries a monotonically increasing `version` bumped on each
//! mutation; stores use it for optimistic concurrency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Booking
// ---------------------------------------------------------------------------

/// Booking lifecycle state. The happy path is linear; `Rejected`,
/// `Cancelled` and `Disputed` are side branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingApproval,
    Approved,
    Paid,
    FileDownloaded,
    Installed,
    Verified,
    Completed,
    Rejected,
    Cancelled,
    Disputed,
}

impl BookingStatus {
    /// Terminal states are immutable once reached, apart from post-hoc
    /// refund bookkeeping.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Rejected | BookingStatus::Cancelled
        )
    }

    /// States before physical installation, from which administrative or
    /// automatic cancellation is legal.
    pub fn is_pre_installation(&self) -> bool {
        matches!(
            self,
            BookingStatus::PendingApproval
                | BookingStatus::Approved
                | BookingStatus::Paid
                | BookingStatus::FileDownloaded
        )
    }
}

/// Financial breakdown computed once at booking creation.
///
/// `total = subtotal + installation_fee + platform_fee`; the owner payout is
/// everything except the platform fee, split across the two payout stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingQuote {
    pub price_per_day: f64,
    pub total_days: u32,
    pub subtotal_amount: f64,
    pub installation_fee: f64,
    pub platform_fee_percent: f64,
    pub platform_fee_amount: f64,
    pub total_amount: f64,
    pub owner_payout_amount: f64,
}

impl PricingQuote {
    pub fn new(
        price_per_day: f64,
        total_days: u32,
        installation_fee: f64,
        platform_fee_percent: f64,
    ) -> Self {
        let subtotal_amount = price_per_day * total_days as f64;
        let platform_fee_amount = subtotal_amount * platform_fee_percent / 100.0;
        let total_amount = subtotal_amount + installation_fee + platform_fee_amount;
        let owner_payout_amount = subtotal_amount + installation_fee;
        Self {
            price_per_day,
            total_days,
            subtotal_amount,
            installation_fee,
            platform_fee_percent,
            platform_fee_amount,
            total_amount,
            owner_payout_amount,
        }
    }

    /// Rental-fee portion of the owner payout (stage 2).
    pub fn rental_portion(&self) -> f64 {
        self.owner_payout_amount - self.installation_fee
    }
}

/// A single advertiser-to-space rental agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub space_id: Uuid,
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub owner_id: Uuid,
    /// Campaign run dates.
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: BookingStatus,
    pub pricing: PricingQuote,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Status the booking held before entering `Disputed`, so an
    /// uphold-owner resolution can resume normal progression.
    pub status_before_dispute: Option<BookingStatus>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when a dispute resolution refunded an already-completed booking.
    pub completed_with_refund: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Proof
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    Pending,
    Approved,
    Rejected,
}

/// Photographic evidence that an ad was physically installed. 1:1 with a
/// booking; resubmission replaces photos, never the entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub status: ProofStatus,
    pub photos: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    /// Deadline after which a still-pending proof auto-resolves to approved.
    pub auto_approve_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Dispute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    NotInstalled,
    WrongLocation,
    DamagedDisplay,
    QualityIssue,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

/// Administrator decision closing a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Resume normal progression and release held payouts.
    UpholdOwner,
    /// Full refund to the advertiser; booking is cancelled (or marked
    /// completed-with-refund if it had already completed).
    UpholdAdvertiser,
    /// Partial refund plus release of held payouts.
    Split { refund_amount: f64 },
}

/// An administrator-mediated override of normal booking progression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub issue_type: IssueType,
    pub reason: String,
    pub evidence_photos: Vec<String>,
    pub disputed_at: DateTime<Utc>,
    pub status: DisputeStatus,
    pub resolution_action: Option<ResolutionAction>,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Payout
// ---------------------------------------------------------------------------

/// One of the two milestone-triggered owner payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStage {
    Install,
    Rental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    PartiallyPaid,
}

/// A milestone-triggered transfer to a space owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub owner_id: Uuid,
    pub stage: PayoutStage,
    pub amount: f64,
    pub status: PayoutStatus,
    /// Held payouts are blocked from transfer while a dispute is open.
    pub held: bool,
    pub external_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Refund
// ---------------------------------------------------------------------------

/// Why a refund was issued. Refund instructions are de-duplicated on
/// (booking id, trigger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundTrigger {
    BookingRejected,
    MissedInstallation,
    DisputeUpheldAdvertiser,
    DisputeSplit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Issued,
    Failed,
    /// Outcome of the payment-reversal call is unknown; parked for manual
    /// reconciliation, never retried automatically.
    ManualReview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub trigger: RefundTrigger,
    pub amount: f64,
    pub status: RefundStatus,
    pub external_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub issued_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Funds captured into escrow at payment time. At most one capture per
/// booking; duplicate payment confirmations reuse the existing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: f64,
    pub external_ref: String,
    pub captured_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BookingCreated,
    BookingApproved,
    BookingRejected,
    PaymentConfirmed,
    FileDownloaded,
    BookingInstalled,
    BookingVerified,
    BookingCompleted,
    BookingCancelled,
    ProofSubmitted,
    ProofApproved,
    ProofRejected,
    PayoutReleased,
    PayoutFailed,
    RefundIssued,
    RefundFlagged,
    DisputeOpened,
    DisputeResolved,
}

/// Notification event emitted by the core. The core only records *that*
/// something happened; delivery (push/email) belongs to the outer layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub booking_id: Uuid,
    /// Proof, dispute, payout or refund id when the event concerns one.
    pub subject_id: Option<Uuid>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}
