//! Operational jobs for the AdSpace Exchange marketplace.

pub mod sweep;

pub use sweep::{SweepReport, SweepRunner};
