//! Application configuration management.
//!
//! Configuration comes from environment variables, deserialized with the
//! `envy` crate into a type-safe struct. A `.env` file is loaded first when
//! present.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PROVIDER_API_URL` (required): transfer provider API base URL
/// - `PROVIDER_API_TOKEN` (required): provider API bearer token
/// - `PROVIDER_WEBHOOK_SECRET` (required): shared secret for webhook HMAC
/// - `FIELD_ENCRYPTION_KEY` (required): 64 hex chars, bank detail decryption
/// - `PLATFORM_FEE_PERCENT` (optional): platform's payout cut, defaults to 0
/// - `BATCH_MAX_CONCURRENT` (optional): batch worker bound, defaults to 5
/// - `PROVIDER_TIMEOUT_SECS` (optional): provider HTTP timeout, defaults to 15
/// - `RECONCILE_INTERVAL_SECS` (optional): poller cadence, defaults to 300
/// - `RECONCILE_STALE_AFTER_SECS` (optional): age before a processing payout
///   is polled, defaults to 900
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub provider_api_url: String,
    pub provider_api_token: String,
    pub provider_webhook_secret: String,

    pub field_encryption_key: String,

    #[serde(default)]
    pub platform_fee_percent: Decimal,

    #[serde(default = "default_batch_max_concurrent")]
    pub batch_max_concurrent: usize,

    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    #[serde(default = "default_reconcile_stale_after_secs")]
    pub reconcile_stale_after_secs: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_batch_max_concurrent() -> usize {
    5
}

fn default_provider_timeout_secs() -> u64 {
    15
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_reconcile_stale_after_secs() -> u64 {
    900
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Attempts to load a `.env` file first (optional), then deserializes
    /// the environment. Field names map to upper-cased variable names:
    /// `database_url` -> `DATABASE_URL`.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>()
    }
}
