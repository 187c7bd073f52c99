//! Token-list-backed DEX adapter.
//!
//! Each exchange curates a tokenlists.org-style list (see
//! https://tokenlists.org). The list is cached on disk under
//! `<token_list_dir>/<exchange id>.json` with a `lastUpdatedTimestamp`
//! and re-downloaded once it is older than the configured TTL. Prices,
//! pairs, and reserves come from the shared `ChainDataProvider`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::ExchangeAdapter;
use crate::config::{CatalogConfig, ExchangeConfig};
use crate::providers::ChainDataProvider;
use crate::types::{ArbError, ExchangeId, PairReserves, PriceQuote, Ratio, TokenInfo, TokenList};

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct DexExchange {
    id: ExchangeId,
    /// Exchange name as the provider backend knows it.
    provider_exchange: String,
    token_list_url: String,
    token_list_path: PathBuf,
    static_token_list: bool,
    token_list_ttl: chrono::Duration,
    chain_id: Option<u64>,
    http: Client,
    provider: Arc<dyn ChainDataProvider>,
    token_list: RwLock<Option<TokenList>>,
    /// Held while a token list is loaded so concurrent lookups share one
    /// download.
    refresh: Mutex<()>,
}

impl DexExchange {
    pub fn new(
        cfg: &ExchangeConfig,
        catalog: &CatalogConfig,
        chain_id: u64,
        timeout: Duration,
        provider: Arc<dyn ChainDataProvider>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("dexarb/0.1.0")
            .build()
            .with_context(|| format!("Failed to build HTTP client for {}", cfg.id))?;

        Ok(Self {
            id: cfg.id.clone(),
            provider_exchange: cfg.provider_exchange.clone(),
            token_list_url: cfg.token_list_url.clone(),
            token_list_path: Path::new(&catalog.token_list_dir).join(format!("{}.json", cfg.id)),
            static_token_list: cfg.static_token_list,
            token_list_ttl: chrono::Duration::hours(catalog.token_list_ttl_hours as i64),
            chain_id: Some(chain_id),
            http,
            provider,
            token_list: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    /// Adapter over an in-memory token list that is never refreshed.
    pub fn with_token_list(
        id: &str,
        provider_exchange: &str,
        list: TokenList,
        provider: Arc<dyn ChainDataProvider>,
    ) -> Self {
        Self {
            id: id.to_string(),
            provider_exchange: provider_exchange.to_string(),
            token_list_url: String::new(),
            token_list_path: PathBuf::new(),
            static_token_list: true,
            token_list_ttl: chrono::Duration::zero(),
            chain_id: None,
            http: Client::new(),
            provider,
            token_list: RwLock::new(Some(list)),
            refresh: Mutex::new(()),
        }
    }

    // -- Token list ------------------------------------------------------

    fn is_fresh(&self, list: &TokenList) -> bool {
        let now = Utc::now().timestamp_millis();
        list.last_updated_timestamp
            .map(|ts| now - ts < self.token_list_ttl.num_milliseconds())
            .unwrap_or(false)
    }

    fn filter_chain(&self, mut list: TokenList) -> TokenList {
        if let Some(chain_id) = self.chain_id {
            list.tokens
                .retain(|t| t.chain_id.map_or(true, |c| c == chain_id));
        }
        list
    }

    fn read_cached(&self) -> Result<TokenList> {
        let json = std::fs::read_to_string(&self.token_list_path).with_context(|| {
            format!("Failed to read token list {}", self.token_list_path.display())
        })?;
        serde_json::from_str(&json).with_context(|| {
            format!("Failed to parse token list {}", self.token_list_path.display())
        })
    }

    async fn download(&self) -> Result<TokenList> {
        debug!(exchange = %self.id, url = %self.token_list_url, "Downloading token list");

        let resp = self
            .http
            .get(&self.token_list_url)
            .send()
            .await
            .with_context(|| format!("Token list request failed for {}", self.id))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(ArbError::Adapter {
                exchange: self.id.clone(),
                message: format!("token list HTTP {status}"),
            }
            .into());
        }

        let mut list: TokenList = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse token list for {}", self.id))?;
        list.last_updated_timestamp = Some(Utc::now().timestamp_millis());

        if let Some(dir) = self.token_list_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(&list).context("Failed to serialise token list")?;
        std::fs::write(&self.token_list_path, json).with_context(|| {
            format!("Failed to write token list {}", self.token_list_path.display())
        })?;

        info!(exchange = %self.id, tokens = list.tokens.len(), "Token list downloaded");
        Ok(list)
    }

    /// Cached copy if fresh, else a new download; a stale cache is still
    /// served when the download fails.
    async fn load_or_download(&self) -> Result<TokenList> {
        if self.static_token_list {
            return self.read_cached();
        }

        let stale = if self.token_list_path.exists() {
            match self.read_cached() {
                Ok(cached) if self.is_fresh(&cached) => return Ok(cached),
                Ok(cached) => Some(cached),
                Err(e) => {
                    warn!(exchange = %self.id, error = %e, "Cached token list unreadable");
                    None
                }
            }
        } else {
            None
        };

        match self.download().await {
            Ok(list) => Ok(list),
            Err(e) => match stale {
                Some(mut cached) => {
                    warn!(exchange = %self.id, error = %e, "Token list refresh failed, using stale copy");
                    // in memory only: retry the download after another TTL
                    cached.last_updated_timestamp = Some(Utc::now().timestamp_millis());
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }

    async fn has_usable_list(&self) -> bool {
        let guard = self.token_list.read().await;
        guard
            .as_ref()
            .is_some_and(|list| self.static_token_list || self.is_fresh(list))
    }

    async fn ensure_token_list(&self) -> Result<()> {
        if self.has_usable_list().await {
            return Ok(());
        }

        let _refresh = self.refresh.lock().await;
        // another caller may have loaded the list while we waited
        if self.has_usable_list().await {
            return Ok(());
        }

        let list = self.filter_chain(self.load_or_download().await?);
        *self.token_list.write().await = Some(list);
        Ok(())
    }

    /// Look up a symbol or address in this exchange's token list.
    async fn resolve(&self, token: &str) -> Result<TokenInfo> {
        self.ensure_token_list().await?;
        let guard = self.token_list.read().await;
        guard
            .as_ref()
            .and_then(|list| list.resolve(token))
            .cloned()
            .ok_or_else(|| {
                ArbError::UnknownToken {
                    exchange: self.id.clone(),
                    token: token.to_string(),
                }
                .into()
            })
    }
}

/// Raw on-chain units to whole tokens.
fn scale_reserve(raw: &str, decimals: u8, exchange: &str) -> Result<f64> {
    let units: f64 = raw.trim().parse().map_err(|_| ArbError::MalformedResponse {
        service: exchange.to_string(),
        message: format!("reserve is not a number: {raw:?}"),
    })?;
    Ok(units / 10f64.powi(i32::from(decimals)))
}

#[async_trait]
impl ExchangeAdapter for DexExchange {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_catalog(&self) -> Result<TokenList> {
        self.ensure_token_list().await?;
        let guard = self.token_list.read().await;
        Ok(guard.as_ref().cloned().unwrap_or_default())
    }

    async fn get_price(&self, token: &str) -> Result<Option<PriceQuote>> {
        let info = self.resolve(token).await?;
        let price = self
            .provider
            .token_price(&info.address, &self.provider_exchange)
            .await?;
        Ok(price.map(|usd_price| PriceQuote { usd_price }))
    }

    async fn get_pair_address(&self, token_a: &str, token_b: &str) -> Result<Option<String>> {
        let a = self.resolve(token_a).await?;
        let b = self.resolve(token_b).await?;
        self.provider
            .pair_address(&a.address, &b.address, &self.provider_exchange)
            .await
    }

    async fn get_pair_reserves(&self, pair_address: &str) -> Result<Option<PairReserves>> {
        self.provider.pair_reserves(pair_address).await
    }

    async fn get_ratio(
        &self,
        token_a: &str,
        token_b: &str,
        reserves: &PairReserves,
    ) -> Result<Option<Ratio>> {
        let a = self.resolve(token_a).await?;
        let b = self.resolve(token_b).await?;

        let price_a = self.provider.token_price(&a.address, &self.provider_exchange).await?;
        let price_b = self.provider.token_price(&b.address, &self.provider_exchange).await?;
        let (Some(price_a), Some(price_b)) = (price_a, price_b) else {
            return Ok(None);
        };

        // reserve1 belongs to token0, the lower address, whichever order
        // the caller named the tokens in
        let (raw_a, raw_b) = if a.address.to_lowercase() <= b.address.to_lowercase() {
            (&reserves.reserve1, &reserves.reserve2)
        } else {
            (&reserves.reserve2, &reserves.reserve1)
        };

        let amount_a = scale_reserve(raw_a, a.decimals, &self.id)?;
        let amount_b = scale_reserve(raw_b, b.decimals, &self.id)?;

        Ok(Some(Ratio::new(price_a * amount_a, price_b * amount_b)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
