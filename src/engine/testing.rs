//! In-memory exchange used by the engine's unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::exchanges::ExchangeAdapter;
use crate::types::{ExchangeId, PairReserves, PriceQuote, Ratio, TokenInfo, TokenList};

#[derive(Default)]
pub struct StubExchange {
    id: String,
    symbols: Vec<String>,
    prices: HashMap<String, f64>,
    ratios: HashMap<(String, String), Ratio>,
    fail_catalog: bool,
    fail_prices: HashSet<String>,
    price_delay: Option<Duration>,
    price_calls: AtomicUsize,
}

impl StubExchange {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn listing(mut self, symbols: &[&str]) -> Self {
        self.symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn price(mut self, symbol: &str, usd: f64) -> Self {
        self.prices.insert(symbol.to_string(), usd);
        self
    }

    /// Ratio returned for `get_ratio(a, b, _)`; also makes the pair exist.
    pub fn ratio(mut self, a: &str, b: &str, numerator: f64, denominator: f64) -> Self {
        self.ratios
            .insert((a.to_string(), b.to_string()), Ratio::new(numerator, denominator));
        self
    }

    pub fn failing_catalog(mut self) -> Self {
        self.fail_catalog = true;
        self
    }

    pub fn failing_price(mut self, symbol: &str) -> Self {
        self.fail_prices.insert(symbol.to_string());
        self
    }

    /// Every price lookup sleeps this long before answering.
    pub fn slow_prices(mut self, delay: Duration) -> Self {
        self.price_delay = Some(delay);
        self
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<dyn ExchangeAdapter> {
        Arc::new(self)
    }
}

#[async_trait]
impl ExchangeAdapter for StubExchange {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_catalog(&self) -> Result<TokenList> {
        if self.fail_catalog {
            return Err(anyhow!("{} catalog offline", self.id));
        }
        Ok(TokenList {
            name: self.id.clone(),
            tokens: self
                .symbols
                .iter()
                .map(|s| TokenInfo {
                    symbol: s.clone(),
                    address: format!("0x{}", s.to_lowercase()),
                    decimals: 18,
                    chain_id: None,
                    name: None,
                })
                .collect(),
            last_updated_timestamp: None,
        })
    }

    async fn get_price(&self, token: &str) -> Result<Option<PriceQuote>> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.price_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_prices.contains(token) {
            return Err(anyhow!("{} price feed down for {token}", self.id));
        }
        Ok(self.prices.get(token).map(|&usd_price| PriceQuote { usd_price }))
    }

    async fn get_pair_address(&self, token_a: &str, token_b: &str) -> Result<Option<String>> {
        let key = (token_a.to_string(), token_b.to_string());
        Ok(self
            .ratios
            .contains_key(&key)
            .then(|| format!("{}:{token_a}:{token_b}", self.id)))
    }

    async fn get_pair_reserves(&self, _pair_address: &str) -> Result<Option<PairReserves>> {
        Ok(Some(PairReserves {
            reserve1: "1".into(),
            reserve2: "1".into(),
        }))
    }

    async fn get_ratio(
        &self,
        token_a: &str,
        token_b: &str,
        _reserves: &PairReserves,
    ) -> Result<Option<Ratio>> {
        Ok(self
            .ratios
            .get(&(token_a.to_string(), token_b.to_string()))
            .copied())
    }
}

/// Index adapters by id, the way the cycle controller does.
pub fn by_id(adapters: &[Arc<dyn ExchangeAdapter>]) -> HashMap<ExchangeId, Arc<dyn ExchangeAdapter>> {
    adapters
        .iter()
        .map(|a| (a.id().to_string(), a.clone()))
        .collect()
}
