//! Dispute lifecycle for the AdSpace Exchange marketplace.

pub mod resolver;

pub use resolver::DisputeResolver;
