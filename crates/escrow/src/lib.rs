//! Escrow money movement — payment capture, staged owner payouts and
//! de-duplicated refunds for the AdSpace Exchange marketplace.

pub mod capture;
pub mod payout;
pub mod refund;

pub use capture::CaptureCoordinator;
pub use payout::PayoutScheduler;
pub use refund::RefundCoordinator;
