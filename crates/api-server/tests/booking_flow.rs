//! Integration test for the full booking lifecycle over the REST surface.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use adspace_api::ApiServer;
use adspace_core::payments::MockPaymentGateway;
use adspace_core::AppConfig;

fn test_router() -> Router {
    let config = AppConfig::default();
    ApiServer::new(config, Arc::new(MockPaymentGateway::new())).router()
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(v) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Booking request whose installation window is open right now.
fn booking_payload() -> Value {
    let start = Utc::now() - Duration::days(1);
    let end = Utc::now() + Duration::days(20);
    json!({
        "space_id": Uuid::new_v4(),
        "campaign_id": Uuid::new_v4(),
        "advertiser_id": Uuid::new_v4(),
        "owner_id": Uuid::new_v4(),
        "start_date": start.to_rfc3339(),
        "end_date": end.to_rfc3339(),
        "price_per_day": 50.0,
        "installation_fee": 100.0,
    })
}

async fn create_booking(router: &Router) -> String {
    let (status, body) = send(router, "POST", "/v1/bookings", Some(booking_payload())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending_approval");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_full_lifecycle_to_verified() {
    let router = test_router();
    let id = create_booking(&router).await;

    for (step, expected) in [
        ("approve", "approved"),
        ("payment-confirmed", "paid"),
        ("file-downloaded", "file_downloaded"),
        ("installed", "installed"),
    ] {
        let uri = format!("/v1/bookings/{}/{}", id, step);
        let (status, body) = send(&router, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK, "step {}", step);
        assert_eq!(body["status"], expected, "step {}", step);
    }

    let (status, body) = send(&router, "GET", &format!("/v1/bookings/{}/window", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "open");

    let (status, proof) = send(
        &router,
        "POST",
        &format!("/v1/bookings/{}/proof", id),
        Some(json!({"photos": ["front.jpg", "side.jpg"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let proof_id = proof["id"].as_str().unwrap();

    let (status, _) = send(
        &router,
        "POST",
        &format!("/v1/proofs/{}/approve", proof_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, booking) = send(&router, "GET", &format!("/v1/bookings/{}", id), None).await;
    assert_eq!(booking["status"], "verified");

    // Proof approval released the install-stage payout.
    let (_, payouts) = send(&router, "GET", &format!("/v1/bookings/{}/payouts", id), None).await;
    let payouts = payouts.as_array().unwrap();
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0]["stage"], "install");
    assert_eq!(payouts[0]["status"], "completed");
}

#[tokio::test]
async fn test_illegal_transition_is_conflict() {
    let router = test_router();
    let id = create_booking(&router).await;

    // Skipping approval and payment: installation is not reachable yet.
    let (status, body) = send(&router, "POST", &format!("/v1/bookings/{}/installed", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_violation");

    // The failed attempt mutated nothing.
    let (_, booking) = send(&router, "GET", &format!("/v1/bookings/{}", id), None).await;
    assert_eq!(booking["status"], "pending_approval");
}

#[tokio::test]
async fn test_duplicate_payment_confirmation_is_conflict() {
    let router = test_router();
    let id = create_booking(&router).await;
    send(&router, "POST", &format!("/v1/bookings/{}/approve", id), None).await;

    let uri = format!("/v1/bookings/{}/payment-confirmed", id);
    let (status, body) = send(&router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paid");

    // A redelivered confirmation does not charge again and conflicts.
    let (status, body) = send(&router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_violation");
    let (_, booking) = send(&router, "GET", &format!("/v1/bookings/{}", id), None).await;
    assert_eq!(booking["status"], "paid");
}

#[tokio::test]
async fn test_rejection_issues_refund() {
    let router = test_router();
    let id = create_booking(&router).await;

    let (status, body) = send(
        &router,
        "POST",
        &format!("/v1/bookings/{}/reject", id),
        Some(json!({"reason": "space already committed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    let (_, refunds) = send(&router, "GET", &format!("/v1/bookings/{}/refunds", id), None).await;
    let refunds = refunds.as_array().unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0]["trigger"], "booking_rejected");
}

#[tokio::test]
async fn test_dispute_uphold_advertiser_over_http() {
    let router = test_router();
    let id = create_booking(&router).await;

    for step in ["approve", "payment-confirmed", "file-downloaded", "installed"] {
        let uri = format!("/v1/bookings/{}/{}", id, step);
        let (status, _) = send(&router, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, proof) = send(
        &router,
        "POST",
        &format!("/v1/bookings/{}/proof", id),
        Some(json!({"photos": ["front.jpg"]})),
    )
    .await;
    let proof_id = proof["id"].as_str().unwrap();
    send(&router, "POST", &format!("/v1/proofs/{}/approve", proof_id), None).await;

    let (status, dispute) = send(
        &router,
        "POST",
        &format!("/v1/bookings/{}/disputes", id),
        Some(json!({
            "issue_type": "wrong_location",
            "reason": "installed on the side wall instead of the facade",
            "evidence_photos": ["actual.jpg"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let dispute_id = dispute["id"].as_str().unwrap();

    let (_, booking) = send(&router, "GET", &format!("/v1/bookings/{}", id), None).await;
    assert_eq!(booking["status"], "disputed");

    let (status, resolved) = send(
        &router,
        "POST",
        &format!("/v1/disputes/{}/resolve", dispute_id),
        Some(json!({"action": "uphold_advertiser", "notes": "owner did not contest"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "resolved");

    let (_, booking) = send(&router, "GET", &format!("/v1/bookings/{}", id), None).await;
    assert_eq!(booking["status"], "cancelled");

    let (_, refunds) = send(&router, "GET", &format!("/v1/bookings/{}/refunds", id), None).await;
    assert_eq!(refunds.as_array().unwrap().len(), 1);

    // Exactly one resolution per dispute.
    let (status, body) = send(
        &router,
        "POST",
        &format!("/v1/disputes/{}/resolve", dispute_id),
        Some(json!({"action": "uphold_owner", "notes": "second thoughts"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_resolved");
}

#[tokio::test]
async fn test_sweep_endpoint_reports_actions() {
    let router = test_router();

    // Booking whose installation window closed two days ago.
    let start = Utc::now() - Duration::days(10);
    let end = Utc::now() + Duration::days(10);
    let mut payload = booking_payload();
    payload["start_date"] = json!(start.to_rfc3339());
    payload["end_date"] = json!(end.to_rfc3339());
    let (_, body) = send(&router, "POST", "/v1/bookings", Some(payload)).await;
    let id = body["id"].as_str().unwrap().to_string();

    for step in ["approve", "payment-confirmed"] {
        send(&router, "POST", &format!("/v1/bookings/{}/{}", id, step), None).await;
    }

    let (status, report) = send(&router, "POST", "/v1/ops/sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["cancelled"], json!([id]));

    let (_, booking) = send(&router, "GET", &format!("/v1/bookings/{}", id), None).await;
    assert_eq!(booking["status"], "cancelled");

    // Re-running is a no-op.
    let (_, report) = send(&router, "POST", "/v1/ops/sweep", None).await;
    assert_eq!(report["cancelled"], json!([]));
}
