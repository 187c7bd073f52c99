//! Chain-data provider backends.
//!
//! Defines the `ChainDataProvider` trait that exchange adapters use for
//! prices, pair addresses, and pool reserves, plus the two backends:
//! - Moralis: REST Web3 API, live data
//! - Snapshot: JSON file of recorded prices/pairs/reserves, offline runs
//!
//! The backend is chosen once at startup from `provider.backend`.

pub mod moralis;
pub mod snapshot;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, ProviderBackend};
use crate::types::{ArbError, PairReserves};

/// Source of on-chain market data for one chain.
///
/// `exchange` is the backend's own name for the DEX (e.g. `"uniswapv2"`).
/// `Ok(None)` means the backend has no data for the request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Spot USD price of a token on an exchange.
    async fn token_price(&self, token_address: &str, exchange: &str) -> Result<Option<f64>>;

    /// Liquidity pool address of a token pair on an exchange.
    async fn pair_address(
        &self,
        token0_address: &str,
        token1_address: &str,
        exchange: &str,
    ) -> Result<Option<String>>;

    /// Current reserves of a liquidity pool.
    async fn pair_reserves(&self, pair_address: &str) -> Result<Option<PairReserves>>;

    /// Backend name for logging and identification.
    fn name(&self) -> &'static str;
}

/// Build the configured backend.
pub fn build_provider(cfg: &AppConfig) -> Result<Arc<dyn ChainDataProvider>> {
    let provider: Arc<dyn ChainDataProvider> = match cfg.provider.backend {
        ProviderBackend::Moralis => {
            let env = cfg.provider.api_key_env.as_deref().ok_or_else(|| {
                ArbError::Config("moralis backend requires provider.api_key_env".into())
            })?;
            let api_key = AppConfig::resolve_secret(env)?;
            Arc::new(
                moralis::MoralisProvider::new(
                    api_key,
                    cfg.provider.base_url.clone(),
                    cfg.chain.id.clone(),
                    cfg.provider.request_timeout(),
                )
                .context("Failed to initialise Moralis provider")?,
            )
        }
        ProviderBackend::Snapshot => {
            let path = cfg.provider.snapshot_path.as_deref().ok_or_else(|| {
                ArbError::Config("snapshot backend requires provider.snapshot_path".into())
            })?;
            Arc::new(snapshot::SnapshotProvider::load(path)?)
        }
    };

    info!(backend = provider.name(), chain = %cfg.chain.id, "Chain data provider ready");
    Ok(provider)
}
