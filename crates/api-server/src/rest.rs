//! REST API handlers for the booking lifecycle and operational endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use adspace_booking::{BookingEngine, CreateBookingRequest, WindowStatus};
use adspace_core::error::MarketError;
use adspace_core::types::{
    Booking, BookingStatus, Dispute, IssueType, Payout, Proof, RefundRecord, RefundTrigger,
    ResolutionAction,
};
use adspace_disputes::DisputeResolver;
use adspace_escrow::{CaptureCoordinator, PayoutScheduler, RefundCoordinator};
use adspace_ops::{SweepReport, SweepRunner};
use adspace_verification::ProofEngine;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub bookings: BookingEngine,
    pub proofs: ProofEngine,
    pub payouts: PayoutScheduler,
    pub refunds: RefundCoordinator,
    pub disputes: DisputeResolver,
    pub sweeper: SweepRunner,
    pub captures: CaptureCoordinator,
    pub node_id: String,
    pub platform_fee_percent: f64,
    pub start_time: Arc<Instant>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Map domain errors onto HTTP statuses. Illegal transitions and stale
/// writes are conflicts (no mutation occurred, the caller may retry from
/// fresh state); gateway failures surface as bad-gateway.
fn api_error(e: MarketError) -> ApiError {
    let (status, code) = match &e {
        MarketError::StateViolation { .. } => (StatusCode::CONFLICT, "state_violation"),
        MarketError::WindowNotOpen { .. } => (StatusCode::CONFLICT, "window_not_open"),
        MarketError::WindowClosed { .. } => (StatusCode::CONFLICT, "window_closed"),
        MarketError::ConcurrencyConflict { .. } => (StatusCode::CONFLICT, "concurrency_conflict"),
        MarketError::AlreadyResolved(_) => (StatusCode::CONFLICT, "already_resolved"),
        MarketError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
        MarketError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        MarketError::Payment(_) => (StatusCode::BAD_GATEWAY, "payment_failed"),
        MarketError::Serialization(_) | MarketError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };
    if status == StatusCode::BAD_REQUEST {
        metrics::counter!("api.validation_errors").increment(1);
    } else if status == StatusCode::CONFLICT {
        metrics::counter!("api.conflicts").increment(1);
    } else if status.is_server_error() {
        metrics::counter!("api.errors").increment(1);
    }
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: e.to_string(),
        }),
    )
}

#[derive(Deserialize)]
pub struct CreateBookingPayload {
    pub space_id: Uuid,
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub owner_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub price_per_day: f64,
    pub installation_fee: f64,
}

#[derive(Deserialize)]
pub struct ReasonPayload {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct SubmitProofPayload {
    pub photos: Vec<String>,
}

#[derive(Deserialize)]
pub struct OpenDisputePayload {
    pub issue_type: IssueType,
    pub reason: String,
    #[serde(default)]
    pub evidence_photos: Vec<String>,
}

#[derive(Deserialize)]
pub struct ResolveDisputePayload {
    #[serde(flatten)]
    pub action: ResolutionAction,
    pub notes: String,
}

/// POST /v1/bookings — advertiser requests a space.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookingPayload>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = state
        .bookings
        .create_booking(CreateBookingRequest {
            space_id: payload.space_id,
            campaign_id: payload.campaign_id,
            advertiser_id: payload.advertiser_id,
            owner_id: payload.owner_id,
            start_date: payload.start_date,
            end_date: payload.end_date,
            price_per_day: payload.price_per_day,
            installation_fee: payload.installation_fee,
            platform_fee_percent: state.platform_fee_percent,
        })
        .map_err(api_error)?;
    metrics::counter!("api.bookings_created").increment(1);
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /v1/bookings/:id
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Booking> {
    state.bookings.get(id).map(Json).map_err(api_error)
}

/// POST /v1/bookings/:id/approve — owner accepts the request.
pub async fn approve_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Booking> {
    state.bookings.approve_booking(id).map(Json).map_err(api_error)
}

/// POST /v1/bookings/:id/reject — owner declines; any captured payment is
/// returned in full.
pub async fn reject_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonPayload>,
) -> ApiResult<Booking> {
    let booking = state
        .bookings
        .reject_booking(id, &payload.reason)
        .map_err(api_error)?;
    if let Err(e) = state
        .refunds
        .issue_refund(&booking, RefundTrigger::BookingRejected, None)
    {
        warn!(booking_id = %id, error = %e, "Rejection refund failed");
    }
    Ok(Json(booking))
}

/// POST /v1/bookings/:id/payment-confirmed — captures the full amount
/// into escrow, then advances the booking. The capture is de-duplicated
/// per booking, so a duplicate or concurrent confirmation never charges
/// twice; it reuses the existing capture and the second transition fails
/// with a conflict.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Booking> {
    let booking = state.bookings.get(id).map_err(api_error)?;
    // Check the transition is legal before moving any money.
    if booking.status != BookingStatus::Approved {
        return Err(api_error(MarketError::StateViolation {
            from: booking.status,
            action: "confirm_payment",
        }));
    }
    state
        .captures
        .capture_for_booking(&booking)
        .map_err(api_error)?;
    state.bookings.confirm_payment(id).map(Json).map_err(api_error)
}

/// POST /v1/bookings/:id/file-downloaded — owner pulled the creative.
pub async fn file_downloaded(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Booking> {
    state
        .bookings
        .mark_file_downloaded(id)
        .map(Json)
        .map_err(api_error)
}

/// POST /v1/bookings/:id/installed — owner marks the physical
/// installation done. Refused outside the installation window.
pub async fn mark_installed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Booking> {
    state
        .bookings
        .mark_installed(id, Utc::now())
        .map(Json)
        .map_err(api_error)
}

/// POST /v1/bookings/:id/cancel — administrative cancellation, legal only
/// before installation.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonPayload>,
) -> ApiResult<Booking> {
    state
        .bookings
        .cancel_booking(id, &payload.reason)
        .map(Json)
        .map_err(api_error)
}

/// GET /v1/bookings/:id/window — installation window countdown copy for
/// the owner dashboard.
pub async fn window_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WindowStatus> {
    state
        .bookings
        .window_status(id, Utc::now())
        .map(Json)
        .map_err(api_error)
}

/// GET /v1/bookings/:id/payouts
pub async fn booking_payouts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Payout>> {
    Ok(Json(state.payouts.list_by_booking(id)))
}

/// GET /v1/bookings/:id/refunds
pub async fn booking_refunds(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<RefundRecord>> {
    Ok(Json(state.refunds.list_by_booking(id)))
}

/// POST /v1/bookings/:id/proof — owner submits installation photos.
pub async fn submit_proof(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitProofPayload>,
) -> Result<(StatusCode, Json<Proof>), ApiError> {
    let proof = state
        .proofs
        .submit_proof(id, payload.photos, Utc::now())
        .map_err(api_error)?;
    metrics::counter!("api.proofs_submitted").increment(1);
    Ok((StatusCode::CREATED, Json(proof)))
}

/// POST /v1/proofs/:id/approve — advertiser accepts the proof, which also
/// makes the install-stage payout due.
pub async fn approve_proof(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Proof> {
    let proof = state
        .proofs
        .approve_proof(id, Utc::now())
        .map_err(api_error)?;
    let booking = state.bookings.get(proof.booking_id).map_err(api_error)?;
    if let Err(e) = state.payouts.release_install_stage(&booking) {
        warn!(booking_id = %booking.id, error = %e, "Install payout release failed");
    }
    Ok(Json(proof))
}

/// POST /v1/proofs/:id/reject
pub async fn reject_proof(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonPayload>,
) -> ApiResult<Proof> {
    state
        .proofs
        .reject_proof(id, &payload.reason, Utc::now())
        .map(Json)
        .map_err(api_error)
}

/// POST /v1/bookings/:id/disputes — advertiser opens a dispute.
pub async fn open_dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OpenDisputePayload>,
) -> Result<(StatusCode, Json<Dispute>), ApiError> {
    let dispute = state
        .disputes
        .open_dispute(
            id,
            payload.issue_type,
            &payload.reason,
            payload.evidence_photos,
            Utc::now(),
        )
        .map_err(api_error)?;
    metrics::counter!("api.disputes_opened").increment(1);
    Ok((StatusCode::CREATED, Json(dispute)))
}

/// POST /v1/disputes/:id/resolve — administrator applies a resolution.
pub async fn resolve_dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResolveDisputePayload>,
) -> ApiResult<Dispute> {
    state
        .disputes
        .resolve_dispute(id, payload.action, &payload.notes, Utc::now())
        .map(Json)
        .map_err(api_error)
}

/// POST /v1/payouts/:id/retry — operator retries a failed payout.
pub async fn retry_payout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Payout> {
    state.payouts.retry(id).map(Json).map_err(api_error)
}

/// POST /v1/ops/sweep — run the deadline sweep now instead of waiting for
/// the scheduled pass.
pub async fn run_sweep(State(state): State<AppState>) -> Json<SweepReport> {
    let report = state.sweeper.run(Utc::now());
    metrics::counter!("ops.sweeps").increment(1);
    Json(report)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe for Kubernetes.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live — Liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
