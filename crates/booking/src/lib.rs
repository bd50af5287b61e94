//! Booking lifecycle core — installation-window arithmetic, the booking
//! state machine, and the engine driving status transitions for the
//! AdSpace Exchange marketplace.

pub mod engine;
pub mod state_machine;
pub mod store;
pub mod window;

pub use engine::{BookingEngine, CreateBookingRequest};
pub use state_machine::BookingStateMachine;
pub use store::BookingStore;
pub use window::{compute_window_status, WindowPhase, WindowStatus};
