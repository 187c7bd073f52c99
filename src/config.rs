//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::types::{ArbError, ExchangeId};

/// Price difference (USD) at or above which two exchanges are compared
/// for a flash-loan trade.
pub const DEFAULT_PRICE_THRESHOLD_USD: f64 = 20.0;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub chain: ChainConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub rate_limit: RateLimitDefaults,
    pub exchanges: Vec<ExchangeConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub scan_interval_secs: u64,
    #[serde(default)]
    pub run_once: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    /// Backend chain name, e.g. `"eth"`.
    pub id: String,
    /// Numeric chain id used to filter token lists.
    pub chain_id: u64,
}

/// Which chain-data backend serves prices, pairs, and reserves.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    Moralis,
    Snapshot,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub backend: ProviderBackend,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub snapshot_path: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "default_threshold")]
    pub price_threshold_usd: f64,
    /// Placeholder gas cost subtracted from every profit estimate.
    #[serde(default)]
    pub gas_cost_usd: f64,
    /// Maximum in-flight lookups during scan and optimize phases.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Zero disables the deadline.
    #[serde(default)]
    pub cycle_deadline_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            price_threshold_usd: DEFAULT_PRICE_THRESHOLD_USD,
            gas_cost_usd: 0.0,
            concurrency: default_concurrency(),
            cycle_deadline_secs: 0,
        }
    }
}

impl DetectionConfig {
    pub fn cycle_deadline(&self) -> Option<Duration> {
        (self.cycle_deadline_secs > 0).then(|| Duration::from_secs(self.cycle_deadline_secs))
    }
}

fn default_threshold() -> f64 {
    DEFAULT_PRICE_THRESHOLD_USD
}

fn default_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub path: String,
    pub token_list_dir: String,
    #[serde(default = "default_token_list_ttl_hours")]
    pub token_list_ttl_hours: u64,
    #[serde(default)]
    pub refresh_on_start: bool,
}

fn default_token_list_ttl_hours() -> u64 {
    24
}

/// What the executor does with a call that would exceed the budget.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeferPolicy {
    /// Sleep until the window rolls over, then re-check.
    #[default]
    Wait,
    /// Return no result immediately.
    Reject,
}

/// A rolling request budget.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Values below 1 disable metering.
    pub limit: i64,
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn unmetered() -> Self {
        Self {
            limit: -1,
            window_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitDefaults {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default)]
    pub defer: DeferPolicy,
}

impl Default for RateLimitDefaults {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
            defer: DeferPolicy::default(),
        }
    }
}

// 3k requests per minute
fn default_limit() -> i64 {
    3000
}

fn default_window_ms() -> u64 {
    60_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub id: ExchangeId,
    pub token_list_url: String,
    /// Exchange name as understood by the data-provider backend.
    pub provider_exchange: String,
    #[serde(default)]
    pub static_token_list: bool,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.exchanges.is_empty() {
            return Err(ArbError::Config("no exchanges configured".into()).into());
        }

        let mut seen = HashSet::new();
        for exchange in &self.exchanges {
            if !seen.insert(exchange.id.as_str()) {
                return Err(
                    ArbError::Config(format!("duplicate exchange id: {}", exchange.id)).into(),
                );
            }
        }

        // NaN fails every comparison, so test for the accepted range
        if !(self.detection.price_threshold_usd.is_finite()
            && self.detection.price_threshold_usd >= 0.0)
        {
            return Err(ArbError::Config(
                "price_threshold_usd must be a finite, non-negative number".into(),
            )
            .into());
        }

        if !self.detection.gas_cost_usd.is_finite() {
            return Err(ArbError::Config("gas_cost_usd must be a finite number".into()).into());
        }

        if self.catalog.token_list_ttl_hours == 0 {
            return Err(ArbError::Config("token_list_ttl_hours must be at least 1".into()).into());
        }

        if self.detection.concurrency == 0 {
            return Err(ArbError::Config("concurrency must be at least 1".into()).into());
        }

        if self.provider.backend == ProviderBackend::Snapshot && self.provider.snapshot_path.is_none()
        {
            return Err(
                ArbError::Config("snapshot backend requires provider.snapshot_path".into()).into(),
            );
        }

        Ok(())
    }

    /// Budget for an exchange: its own override, else the defaults.
    pub fn rate_limit_for(&self, exchange: &ExchangeConfig) -> RateLimitConfig {
        exchange.rate_limit.unwrap_or(RateLimitConfig {
            limit: self.rate_limit.limit,
            window_ms: self.rate_limit.window_ms,
        })
    }

    pub fn exchange_ids(&self) -> Vec<ExchangeId> {
        self.exchanges.iter().map(|e| e.id.clone()).collect()
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve a secret referenced by env-var name.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }
}
