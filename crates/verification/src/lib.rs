//! Proof verification — installation-proof submission, advertiser
//! decisions, and lazy auto-approval for the AdSpace Exchange marketplace.

pub mod engine;

pub use engine::ProofEngine;
