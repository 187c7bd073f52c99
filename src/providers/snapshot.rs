//! Offline backend serving recorded chain data from a JSON file.
//!
//! File shape:
//! ```json
//! {
//!   "prices":   { "<exchange>": { "<token address>": 1.0 } },
//!   "pairs":    { "<exchange>": { "<addrA>:<addrB>": "<pair address>" } },
//!   "reserves": { "<pair address>": { "reserve1": "...", "reserve2": "..." } }
//! }
//! ```
//! Addresses are matched case-insensitively and pair keys in either order.
//! As on chain, `reserve1` is the reserve of token0 (the lower of the two
//! token addresses) and `reserve2` that of token1.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

use super::ChainDataProvider;
use crate::types::PairReserves;

const PROVIDER_NAME: &str = "snapshot";

#[derive(Debug, Default, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    prices: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    pairs: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    reserves: HashMap<String, PairReserves>,
}

/// Order-independent key for a token pair.
fn pair_key(a: &str, b: &str) -> String {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

#[derive(Debug, Default)]
pub struct SnapshotProvider {
    prices: HashMap<String, HashMap<String, f64>>,
    pairs: HashMap<String, HashMap<String, String>>,
    reserves: HashMap<String, PairReserves>,
}

impl SnapshotProvider {
    pub fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot from {path}"))?;
        let provider = Self::from_json(&json)
            .with_context(|| format!("Failed to parse snapshot from {path}"))?;

        info!(
            path,
            exchanges = provider.prices.len(),
            pools = provider.reserves.len(),
            "Snapshot loaded"
        );
        Ok(provider)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: SnapshotFile = serde_json::from_str(json)?;

        let prices = file
            .prices
            .into_iter()
            .map(|(exchange, by_token)| {
                let by_token = by_token
                    .into_iter()
                    .map(|(addr, price)| (addr.to_lowercase(), price))
                    .collect();
                (exchange, by_token)
            })
            .collect();

        let pairs = file
            .pairs
            .into_iter()
            .map(|(exchange, by_pair)| {
                let by_pair = by_pair
                    .into_iter()
                    .filter_map(|(key, pair)| {
                        let (a, b) = key.split_once(':')?;
                        Some((pair_key(a, b), pair))
                    })
                    .collect();
                (exchange, by_pair)
            })
            .collect();

        let reserves = file
            .reserves
            .into_iter()
            .map(|(pair, r)| (pair.to_lowercase(), r))
            .collect();

        Ok(Self {
            prices,
            pairs,
            reserves,
        })
    }
}

#[async_trait]
impl ChainDataProvider for SnapshotProvider {
    async fn token_price(&self, token_address: &str, exchange: &str) -> Result<Option<f64>> {
        Ok(self
            .prices
            .get(exchange)
            .and_then(|p| p.get(&token_address.to_lowercase()))
            .copied())
    }

    async fn pair_address(
        &self,
        token0_address: &str,
        token1_address: &str,
        exchange: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .pairs
            .get(exchange)
            .and_then(|p| p.get(&pair_key(token0_address, token1_address)))
            .cloned())
    }

    async fn pair_reserves(&self, pair_address: &str) -> Result<Option<PairReserves>> {
        Ok(self.reserves.get(&pair_address.to_lowercase()).cloned())
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}
