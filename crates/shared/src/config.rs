//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Wallet/channel defaults.
    #[serde(default)]
    pub wallet: WalletSettings,
    /// Balance-authorization windows and sweep cadence.
    #[serde(default)]
    pub authorization: AuthorizationSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Channel-level wallet defaults applied to newly created accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletSettings {
    /// Default daily movement limit for new accounts.
    #[serde(default = "default_daily_limit")]
    pub default_daily_limit: Decimal,
    /// Default monthly movement limit for new accounts.
    #[serde(default = "default_monthly_limit")]
    pub default_monthly_limit: Decimal,
    /// Whether accounts are created automatically on first reference.
    #[serde(default = "default_true")]
    pub auto_create_accounts: bool,
    /// Whether the cash balance may go negative.
    #[serde(default)]
    pub allow_negative_balance: bool,
    /// Default cashback retention period in days.
    #[serde(default = "default_retention_days")]
    pub cashback_retention_days: u32,
    /// Interval between cashback retention sweeps, in seconds.
    #[serde(default = "default_cashback_sweep_interval")]
    pub cashback_sweep_interval_secs: u64,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            default_daily_limit: default_daily_limit(),
            default_monthly_limit: default_monthly_limit(),
            auto_create_accounts: true,
            allow_negative_balance: false,
            cashback_retention_days: default_retention_days(),
            cashback_sweep_interval_secs: default_cashback_sweep_interval(),
        }
    }
}

fn default_daily_limit() -> Decimal {
    Decimal::from(5_000)
}

fn default_monthly_limit() -> Decimal {
    Decimal::from(50_000)
}

fn default_retention_days() -> u32 {
    30
}

fn default_cashback_sweep_interval() -> u64 {
    3_600 // 1 hour
}

fn default_true() -> bool {
    true
}

/// Balance-authorization configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationSettings {
    /// Seconds a PENDING authorization stays approvable.
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,
    /// Seconds an APPROVED authorization stays debitable.
    #[serde(default = "default_approved_ttl")]
    pub approved_ttl_secs: u64,
    /// Interval between expiration sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            pending_ttl_secs: default_pending_ttl(),
            approved_ttl_secs: default_approved_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_pending_ttl() -> u64 {
    180 // 3 minutes to approve in the app
}

fn default_approved_ttl() -> u64 {
    120 // 2 minutes for the POS to debit
}

fn default_sweep_interval() -> u64 {
    60
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("WALLET").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
