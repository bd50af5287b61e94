//! Notification event bus — trait for emitting booking-lifecycle events
//! from any module.
//!
//! Engines accept an `Arc<dyn EventSink>` and fire events without awaiting
//! delivery; routing to push/email/webhooks is an outer-layer concern.

use crate::types::{EventType, MarketplaceEvent};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Fire-and-forget sink for marketplace events. Never awaited for
/// correctness: a lost event must not affect booking state.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MarketplaceEvent);
}

/// No-op sink for tests and modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: MarketplaceEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<MarketplaceEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<MarketplaceEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: MarketplaceEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Sink that logs every event through `tracing`, for deployments without
/// an external notification pipeline.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: MarketplaceEvent) {
        tracing::info!(
            event_id = %event.event_id,
            event_type = ?event.event_type,
            booking_id = %event.booking_id,
            subject_id = ?event.subject_id,
            "Marketplace event"
        );
    }
}

/// Convenience builder for creating `MarketplaceEvent` with minimal
/// boilerplate.
pub fn make_event(
    event_type: EventType,
    booking_id: Uuid,
    subject_id: Option<Uuid>,
    detail: Option<String>,
) -> MarketplaceEvent {
    MarketplaceEvent {
        event_id: Uuid::new_v4(),
        event_type,
        booking_id,
        subject_id,
        detail,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
