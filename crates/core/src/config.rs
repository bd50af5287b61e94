use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ADSPACE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

/// Time-window and fee policy knobs for the booking lifecycle.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    /// Installation window half-width: opens this many days before the
    /// campaign start and closes the same number of days after it.
    #[serde(default = "default_installation_window_days")]
    pub installation_window_days: i64,
    /// Grace period before a pending proof auto-resolves to approved.
    #[serde(default = "default_proof_auto_approve_hours")]
    pub proof_auto_approve_hours: i64,
    /// How long after completion a dispute may still be opened.
    #[serde(default = "default_dispute_grace_days")]
    pub dispute_grace_days: i64,
    #[serde(default = "default_platform_fee_percent")]
    pub platform_fee_percent: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default = "default_payments_provider")]
    pub provider: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_installation_window_days() -> i64 {
    7
}
fn default_proof_auto_approve_hours() -> i64 {
    48
}
fn default_dispute_grace_days() -> i64 {
    7
}
fn default_platform_fee_percent() -> f64 {
    10.0
}
fn default_payments_provider() -> String {
    "mock".to_string()
}
fn default_currency() -> String {
    "USD".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            installation_window_days: default_installation_window_days(),
            proof_auto_approve_hours: default_proof_auto_approve_hours(),
            dispute_grace_days: default_dispute_grace_days(),
            platform_fee_percent: default_platform_fee_percent(),
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            provider: default_payments_provider(),
            currency: default_currency(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            booking: BookingConfig::default(),
            payments: PaymentsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ADSPACE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
