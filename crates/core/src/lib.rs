pub mod config;
pub mod error;
pub mod event_bus;
pub mod payments;
pub mod types;

pub use config::AppConfig;
pub use error::{MarketError, MarketResult};
