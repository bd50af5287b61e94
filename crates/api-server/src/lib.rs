//! HTTP API for the AdSpace Exchange marketplace.

pub mod rest;
pub mod server;

pub use rest::AppState;
pub use server::ApiServer;
