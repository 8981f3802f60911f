//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (wallet key, RPC endpoint) are referenced by env-var name in the
//! config and resolved at runtime. The strategy and execution tunables can
//! also be overridden from the environment (`SELL_DELAY_SECONDS`,
//! `TAKE_PROFIT_SOL`, ...), which is how the bot is usually tuned in a
//! `.env` file.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use crate::types::AutosellerError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WalletConfig {
    /// Env var holding the base58 dev wallet secret key.
    pub private_key_env: String,
    /// Env var holding the RPC endpoint URL.
    pub rpc_url_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "DEV_PRIVATE_KEY".into(),
            rpc_url_env: "RPC_URL".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrategyConfig {
    /// Sell once a token is this old, whatever its value.
    pub sell_delay_secs: u64,
    /// Sell once the holding is worth at least this much SOL.
    pub take_profit_sol: Decimal,
    /// Accepted shortfall below the estimated value, in percent.
    pub slippage_percent: Decimal,
    pub max_sell_retries: u32,
    /// Pause after a failed sell before evaluating the next token.
    pub retry_delay_secs: u64,
    pub poll_interval_secs: u64,
    /// Signatures fetched per creation scan.
    pub scan_batch_size: usize,
    /// History pages one scan may read when more than a batch of
    /// signatures landed since the last poll.
    pub scan_max_pages: usize,
    /// A failed cycle waits this many poll intervals before the next one.
    pub cycle_error_backoff_multiplier: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            sell_delay_secs: 15,
            take_profit_sol: dec!(0.05),
            slippage_percent: dec!(25.0),
            max_sell_retries: 5,
            retry_delay_secs: 2,
            poll_interval_secs: 2,
            scan_batch_size: 20,
            scan_max_pages: 10,
            cycle_error_backoff_multiplier: 5,
        }
    }
}

impl StrategyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn sell_delay(&self) -> Duration {
        Duration::from_secs(self.sell_delay_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Log sells instead of sending them.
    pub dry_run: bool,
    /// Compute unit price (µlamports/CU). Zero disables the instruction.
    pub priority_micro_lamports: u64,
    /// Compute unit limit. Zero disables the instruction.
    pub compute_units: u32,
    pub confirm_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            priority_micro_lamports: 50_000,
            compute_units: 200_000,
            confirm_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub state_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: crate::storage::DEFAULT_STATE_FILE.into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5001,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, apply environment overrides,
    /// and validate the result.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Override tunables from `lookup` (the process environment in
    /// production). Unparseable values are configuration errors.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), AutosellerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: FromStr>(key: &str, raw: String) -> Result<T, AutosellerError> {
            raw.trim()
                .parse()
                .map_err(|_| AutosellerError::Config(format!("{key} has an invalid value: {raw}")))
        }

        let s = &mut self.strategy;
        if let Some(v) = lookup("SELL_DELAY_SECONDS") {
            s.sell_delay_secs = parse("SELL_DELAY_SECONDS", v)?;
        }
        if let Some(v) = lookup("TAKE_PROFIT_SOL") {
            s.take_profit_sol = parse("TAKE_PROFIT_SOL", v)?;
        }
        if let Some(v) = lookup("CHECK_INTERVAL_SECONDS") {
            s.poll_interval_secs = parse("CHECK_INTERVAL_SECONDS", v)?;
        }
        if let Some(v) = lookup("MAX_SELL_RETRIES") {
            s.max_sell_retries = parse("MAX_SELL_RETRIES", v)?;
        }
        if let Some(v) = lookup("RETRY_DELAY_SECONDS") {
            s.retry_delay_secs = parse("RETRY_DELAY_SECONDS", v)?;
        }
        if let Some(v) = lookup("SLIPPAGE_PERCENT") {
            s.slippage_percent = parse("SLIPPAGE_PERCENT", v)?;
        }

        let e = &mut self.execution;
        if let Some(v) = lookup("TRANSACTION_PRIORITY_MICRO_LAMPORTS") {
            e.priority_micro_lamports = parse("TRANSACTION_PRIORITY_MICRO_LAMPORTS", v)?;
        }
        if let Some(v) = lookup("TRANSACTION_COMPUTE_UNITS") {
            e.compute_units = parse("TRANSACTION_COMPUTE_UNITS", v)?;
        }

        if let Some(v) = lookup("STATE_FILE") {
            self.storage.state_file = v;
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), AutosellerError> {
        let s = &self.strategy;
        if s.slippage_percent < Decimal::ZERO || s.slippage_percent > dec!(100) {
            return Err(AutosellerError::Config(format!(
                "slippage_percent must be within 0..=100, got {}",
                s.slippage_percent
            )));
        }
        if s.take_profit_sol < Decimal::ZERO {
            return Err(AutosellerError::Config("take_profit_sol must not be negative".into()));
        }
        if s.poll_interval_secs == 0 {
            return Err(AutosellerError::Config("poll_interval_secs must be positive".into()));
        }
        if s.max_sell_retries == 0 {
            return Err(AutosellerError::Config("max_sell_retries must be at least 1".into()));
        }
        if s.scan_batch_size == 0 {
            return Err(AutosellerError::Config("scan_batch_size must be positive".into()));
        }
        if s.scan_max_pages == 0 {
            return Err(AutosellerError::Config("scan_max_pages must be positive".into()));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The dev wallet secret, kept out of `Debug` output and logs.
    pub fn wallet_secret(&self) -> Result<SecretString> {
        Self::resolve_env(&self.wallet.private_key_env).map(SecretString::new)
    }

    pub fn rpc_url(&self) -> Result<String> {
        Self::resolve_env(&self.wallet.rpc_url_env)
    }
}
