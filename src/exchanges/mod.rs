//! Exchange integrations.
//!
//! Defines the `ExchangeAdapter` trait the engine consumes and provides
//! `DexExchange`, a token-list-backed adapter that answers price, pair,
//! and reserve lookups through a shared `ChainDataProvider`.

pub mod dex;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::providers::ChainDataProvider;
use crate::types::{PairReserves, PriceQuote, Ratio, TokenList};

/// Abstraction over decentralized exchanges.
///
/// Tokens may be passed as symbol or address. `Ok(None)` means the
/// exchange has no data for the request; `Err` means it failed to answer.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Stable identifier, used as the exchange id everywhere.
    fn id(&self) -> &str;

    /// Tokens listed on this exchange.
    async fn get_catalog(&self) -> Result<TokenList>;

    /// Spot USD price of a token.
    async fn get_price(&self, token: &str) -> Result<Option<PriceQuote>>;

    /// Liquidity pool address of a token pair.
    async fn get_pair_address(&self, token_a: &str, token_b: &str) -> Result<Option<String>>;

    /// Current reserves of a liquidity pool.
    async fn get_pair_reserves(&self, pair_address: &str) -> Result<Option<PairReserves>>;

    /// Convert a pair's reserves into comparable USD amounts:
    /// `price(a) * reserve(a)` over `price(b) * reserve(b)`, with reserves
    /// in token0/token1 order (`reserve1` is the lower address).
    async fn get_ratio(
        &self,
        token_a: &str,
        token_b: &str,
        reserves: &PairReserves,
    ) -> Result<Option<Ratio>>;
}

/// Build one adapter per configured exchange, all sharing `provider`.
pub fn build_exchanges(
    cfg: &AppConfig,
    provider: Arc<dyn ChainDataProvider>,
) -> Result<Vec<Arc<dyn ExchangeAdapter>>> {
    cfg.exchanges
        .iter()
        .map(|ex| {
            let adapter = dex::DexExchange::new(
                ex,
                &cfg.catalog,
                cfg.chain.chain_id,
                cfg.provider.request_timeout(),
                provider.clone(),
            )?;
            Ok(Arc::new(adapter) as Arc<dyn ExchangeAdapter>)
        })
        .collect()
}
