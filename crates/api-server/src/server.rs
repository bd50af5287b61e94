//! API server — HTTP surface for the marketplace engines.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use adspace_booking::{BookingEngine, BookingStore};
use adspace_core::event_bus::{EventSink, TracingSink};
use adspace_core::payments::PaymentGateway;
use adspace_core::AppConfig;
use adspace_disputes::DisputeResolver;
use adspace_escrow::{CaptureCoordinator, PayoutScheduler, RefundCoordinator};
use adspace_ops::SweepRunner;
use adspace_verification::ProofEngine;

use crate::rest::{self, AppState};

/// Wires the engines together and serves the REST API.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, gateway: Arc<dyn PaymentGateway>) -> Self {
        let events: Arc<dyn EventSink> = Arc::new(TracingSink);
        let bookings = BookingEngine::new(
            Arc::new(BookingStore::new()),
            config.booking.installation_window_days,
        )
        .with_event_sink(events.clone());
        let proofs = ProofEngine::new(bookings.clone(), config.booking.proof_auto_approve_hours)
            .with_event_sink(events.clone());
        let captures = CaptureCoordinator::new(gateway.clone());
        let payouts = PayoutScheduler::new(gateway.clone()).with_event_sink(events.clone());
        let refunds = RefundCoordinator::new(gateway).with_event_sink(events.clone());
        let disputes = DisputeResolver::new(
            bookings.clone(),
            payouts.clone(),
            refunds.clone(),
            config.booking.dispute_grace_days,
        )
        .with_event_sink(events);
        let sweeper = SweepRunner::new(
            bookings.clone(),
            proofs.clone(),
            payouts.clone(),
            refunds.clone(),
        );

        let state = AppState {
            bookings,
            proofs,
            payouts,
            refunds,
            disputes,
            sweeper,
            captures,
            node_id: config.node_id.clone(),
            platform_fee_percent: config.booking.platform_fee_percent,
            start_time: Arc::new(Instant::now()),
        };
        Self { config, state }
    }

    /// Shared engine handles, for wiring background jobs.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        Router::new()
            // Booking lifecycle
            .route("/v1/bookings", post(rest::create_booking))
            .route("/v1/bookings/:id", get(rest::get_booking))
            .route("/v1/bookings/:id/approve", post(rest::approve_booking))
            .route("/v1/bookings/:id/reject", post(rest::reject_booking))
            .route(
                "/v1/bookings/:id/payment-confirmed",
                post(rest::confirm_payment),
            )
            .route(
                "/v1/bookings/:id/file-downloaded",
                post(rest::file_downloaded),
            )
            .route("/v1/bookings/:id/installed", post(rest::mark_installed))
            .route("/v1/bookings/:id/cancel", post(rest::cancel_booking))
            .route("/v1/bookings/:id/window", get(rest::window_status))
            .route("/v1/bookings/:id/payouts", get(rest::booking_payouts))
            .route("/v1/bookings/:id/refunds", get(rest::booking_refunds))
            // Proof verification
            .route("/v1/bookings/:id/proof", post(rest::submit_proof))
            .route("/v1/proofs/:id/approve", post(rest::approve_proof))
            .route("/v1/proofs/:id/reject", post(rest::reject_proof))
            // Disputes
            .route("/v1/bookings/:id/disputes", post(rest::open_dispute))
            .route("/v1/disputes/:id/resolve", post(rest::resolve_dispute))
            // Escrow operations
            .route("/v1/payouts/:id/retry", post(rest::retry_payout))
            .route("/v1/ops/sweep", post(rest::run_sweep))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
