//! Mock exchange for integration testing.
//!
//! Provides a deterministic `ExchangeAdapter` implementation that serves
//! a fixed token list, per-token prices and per-pair ratios, all
//! in-memory with no external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dexarb::exchanges::ExchangeAdapter;
use dexarb::types::{PairReserves, PriceQuote, Ratio, TokenInfo, TokenList};

/// A mock DEX for deterministic testing.
///
/// Prices and ratios can be changed between cycles from test code.
pub struct MockExchange {
    id: String,
    symbols: Vec<String>,
    prices: Mutex<HashMap<String, f64>>,
    ratios: Mutex<HashMap<(String, String), Ratio>>,
    /// If set, every call returns this error.
    force_error: Mutex<Option<String>>,
    catalog_calls: AtomicUsize,
    price_calls: AtomicUsize,
}

impl MockExchange {
    pub fn new(id: &str, symbols: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            prices: Mutex::new(HashMap::new()),
            ratios: Mutex::new(HashMap::new()),
            force_error: Mutex::new(None),
            catalog_calls: AtomicUsize::new(0),
            price_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, symbol: &str, usd: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), usd);
    }

    pub fn set_ratio(&self, a: &str, b: &str, numerator: f64, denominator: f64) {
        self.ratios
            .lock()
            .unwrap()
            .insert((a.to_string(), b.to_string()), Ratio::new(numerator, denominator));
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{}: {msg}", self.id)),
            None => Ok(()),
        }
    }
}

/// Coerce shared mocks into the adapter list the engine takes.
pub fn adapters(mocks: &[&Arc<MockExchange>]) -> Vec<Arc<dyn ExchangeAdapter>> {
    mocks
        .iter()
        .map(|m| Arc::clone(m) as Arc<dyn ExchangeAdapter>)
        .collect()
}

#[async_trait]
impl ExchangeAdapter for MockExchange {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_catalog(&self) -> Result<TokenList> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error()?;
        Ok(TokenList {
            name: format!("{} tokens", self.id),
            tokens: self
                .symbols
                .iter()
                .map(|s| TokenInfo {
                    symbol: s.clone(),
                    address: format!("0x{}", s.to_lowercase()),
                    decimals: 18,
                    chain_id: Some(1),
                    name: None,
                })
                .collect(),
            last_updated_timestamp: None,
        })
    }

    async fn get_price(&self, token: &str) -> Result<Option<PriceQuote>> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error()?;
        let prices = self.prices.lock().unwrap();
        Ok(prices.get(token).map(|&usd_price| PriceQuote { usd_price }))
    }

    async fn get_pair_address(&self, token_a: &str, token_b: &str) -> Result<Option<String>> {
        self.check_error()?;
        let ratios = self.ratios.lock().unwrap();
        Ok(ratios
            .contains_key(&(token_a.to_string(), token_b.to_string()))
            .then(|| format!("{}-{token_a}-{token_b}", self.id)))
    }

    async fn get_pair_reserves(&self, _pair_address: &str) -> Result<Option<PairReserves>> {
        self.check_error()?;
        Ok(Some(PairReserves {
            reserve1: "1000".into(),
            reserve2: "1000".into(),
        }))
    }

    async fn get_ratio(
        &self,
        token_a: &str,
        token_b: &str,
        _reserves: &PairReserves,
    ) -> Result<Option<Ratio>> {
        self.check_error()?;
        let ratios = self.ratios.lock().unwrap();
        Ok(ratios.get(&(token_a.to_string(), token_b.to_string())).copied())
    }
}
