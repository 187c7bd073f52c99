//! Shared types for the dexarb scanner.
//!
//! These types form the data model used across all modules: the master
//! token catalog, the per-cycle price scan cache, difference candidates,
//! and the flash-loan options attached to them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Stable identifier of an exchange adapter (e.g. `"uniswap-v2"`).
pub type ExchangeId = String;

// ---------------------------------------------------------------------------
// Token lists (exchange catalogs)
// ---------------------------------------------------------------------------

/// A single token as listed by an exchange's token list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub symbol: String,
    pub address: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_decimals() -> u8 {
    18
}

/// A tokenlists.org-style list, as served and cached by an exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenList {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
    /// Milliseconds since epoch when the list was last downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_timestamp: Option<i64>,
}

impl TokenList {
    /// Resolve a symbol or address to the listed token.
    ///
    /// Addresses compare case-insensitively; symbols compare exactly.
    pub fn resolve(&self, symbol_or_address: &str) -> Option<&TokenInfo> {
        self.tokens.iter().find(|t| {
            t.symbol == symbol_or_address || t.address.eq_ignore_ascii_case(symbol_or_address)
        })
    }
}

// ---------------------------------------------------------------------------
// Master catalog
// ---------------------------------------------------------------------------

/// One token in the master catalog and the exchanges that list it.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEntry {
    pub symbol: String,
    /// Exchanges in first-seen order. Append-only.
    pub supported_exchanges: Vec<ExchangeId>,
}

impl TokenEntry {
    pub fn supports(&self, exchange: &str) -> bool {
        self.supported_exchanges.iter().any(|e| e == exchange)
    }
}

/// On-disk shape of a catalog entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntry {
    supported_exchanges: Vec<ExchangeId>,
}

/// Union of every exchange's token catalog, keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterCatalog {
    entries: BTreeMap<String, TokenEntry>,
}

impl MasterCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `exchange` lists `symbol`.
    ///
    /// Returns `true` if the catalog changed.
    pub fn insert_listing(&mut self, symbol: &str, exchange: &str) -> bool {
        match self.entries.get_mut(symbol) {
            Some(entry) => {
                if entry.supports(exchange) {
                    false
                } else {
                    entry.supported_exchanges.push(exchange.to_string());
                    true
                }
            }
            None => {
                self.entries.insert(
                    symbol.to_string(),
                    TokenEntry {
                        symbol: symbol.to_string(),
                        supported_exchanges: vec![exchange.to_string()],
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&TokenEntry> {
        self.entries.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    /// Entries in sorted symbol order.
    pub fn iter(&self) -> impl Iterator<Item = &TokenEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tokens listed on at least two exchanges, in sorted symbol order.
    pub fn multi_exchange_tokens(&self) -> impl Iterator<Item = &TokenEntry> {
        self.entries
            .values()
            .filter(|e| e.supported_exchanges.len() > 1)
    }

    /// Tokens other than `exclude` that are listed on both exchanges.
    pub fn listed_on_both<'a>(
        &'a self,
        a: &'a str,
        b: &'a str,
        exclude: &'a str,
    ) -> impl Iterator<Item = &'a TokenEntry> + 'a {
        self.entries
            .values()
            .filter(move |e| e.symbol != exclude && e.supports(a) && e.supports(b))
    }

    /// Re-derive exchange membership against the configured exchanges.
    ///
    /// Unknown and duplicate exchange ids are removed; tokens left with no
    /// exchange are dropped. Returns the number of corrections made.
    pub fn reconcile(&mut self, known_exchanges: &[ExchangeId]) -> usize {
        let mut corrections = 0;

        for entry in self.entries.values_mut() {
            let mut kept: Vec<ExchangeId> = Vec::with_capacity(entry.supported_exchanges.len());
            for exchange in entry.supported_exchanges.drain(..) {
                if !known_exchanges.contains(&exchange) {
                    warn!(
                        token = %entry.symbol,
                        exchange = %exchange,
                        "Catalog lists token on an unconfigured exchange, removing"
                    );
                    corrections += 1;
                } else if kept.contains(&exchange) {
                    warn!(
                        token = %entry.symbol,
                        exchange = %exchange,
                        "Duplicate exchange in catalog entry, removing"
                    );
                    corrections += 1;
                } else {
                    kept.push(exchange);
                }
            }
            entry.supported_exchanges = kept;
        }

        let before = self.entries.len();
        self.entries.retain(|_, e| !e.supported_exchanges.is_empty());
        corrections + (before - self.entries.len())
    }

    /// Serialize to the stable on-disk form (2-space indented JSON,
    /// keys in sorted symbol order).
    pub fn to_json(&self) -> Result<String> {
        let persisted: BTreeMap<&str, PersistedEntry> = self
            .entries
            .iter()
            .map(|(symbol, entry)| {
                (
                    symbol.as_str(),
                    PersistedEntry {
                        supported_exchanges: entry.supported_exchanges.clone(),
                    },
                )
            })
            .collect();
        serde_json::to_string_pretty(&persisted).context("Failed to serialise master catalog")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let persisted: BTreeMap<String, PersistedEntry> =
            serde_json::from_str(json).context("Failed to parse master catalog")?;
        let entries = persisted
            .into_iter()
            .map(|(symbol, p)| {
                let entry = TokenEntry {
                    symbol: symbol.clone(),
                    supported_exchanges: p.supported_exchanges,
                };
                (symbol, entry)
            })
            .collect();
        Ok(Self { entries })
    }
}

// ---------------------------------------------------------------------------
// Scan cache
// ---------------------------------------------------------------------------

/// A spot USD price observed on one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub usd_price: f64,
}

/// Prices of one token across the exchanges that answered this cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRecord {
    pub exchanges: BTreeMap<ExchangeId, PriceQuote>,
}

/// Per-cycle memo of `(token, exchange) -> price`.
///
/// A cell that could not be priced is absent, never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanCache {
    records: BTreeMap<String, ScanRecord>,
}

impl ScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, symbol: &str, exchange: &str, usd_price: f64) {
        self.records
            .entry(symbol.to_string())
            .or_default()
            .exchanges
            .insert(exchange.to_string(), PriceQuote { usd_price });
    }

    pub fn contains(&self, symbol: &str, exchange: &str) -> bool {
        self.price(symbol, exchange).is_some()
    }

    pub fn price(&self, symbol: &str, exchange: &str) -> Option<f64> {
        self.records
            .get(symbol)
            .and_then(|r| r.exchanges.get(exchange))
            .map(|q| q.usd_price)
    }

    pub fn get(&self, symbol: &str) -> Option<&ScanRecord> {
        self.records.get(symbol)
    }

    /// Records in sorted symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScanRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total number of priced `(token, exchange)` cells.
    pub fn cell_count(&self) -> usize {
        self.records.values().map(|r| r.exchanges.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Pair data
// ---------------------------------------------------------------------------

/// Raw on-chain reserves of a liquidity pool, as decimal strings.
/// `reserve1` belongs to token0, the pair's lower address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReserves {
    pub reserve1: String,
    pub reserve2: String,
}

/// Reserves of a token pair converted to comparable USD amounts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: f64,
    pub denominator: f64,
}

impl Ratio {
    pub fn new(numerator: f64, denominator: f64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `numerator - denominator`, the ratio's contribution to profit.
    pub fn imbalance(&self) -> f64 {
        self.numerator - self.denominator
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}:{:.4}", self.numerator, self.denominator)
    }
}

// ---------------------------------------------------------------------------
// Detection output
// ---------------------------------------------------------------------------

/// A token usable as flash-loan instrument for a difference candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashloanOption {
    pub symbol: String,
    pub ratio_on_low: Ratio,
    pub ratio_on_high: Ratio,
    pub estimated_profit: f64,
}

/// A token priced differently on two exchanges by at least the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceCandidate {
    pub token: String,
    pub exchange_low: ExchangeId,
    pub exchange_high: ExchangeId,
    pub price_low: f64,
    pub price_high: f64,
    /// `price_high - price_low`
    pub spread: f64,
    #[serde(default)]
    pub flash_loan_tokens: Vec<FlashloanOption>,
}

impl fmt::Display for DifferenceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: buy on {} @ ${:.4}, sell on {} @ ${:.4} (spread ${:.4}, {} flash-loan option(s))",
            self.token,
            self.exchange_low,
            self.price_low,
            self.exchange_high,
            self.price_high,
            self.spread,
            self.flash_loan_tokens.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ArbError {
    #[error("Malformed response from {service}: {message}")]
    MalformedResponse { service: String, message: String },

    #[error("Exchange error ({exchange}): {message}")]
    Adapter { exchange: String, message: String },

    #[error("Unknown token on {exchange}: {token}")]
    UnknownToken { exchange: String, token: String },

    #[error("Rate limit reached for {service}, retry in {retry_after_ms}ms")]
    RateLimited { service: String, retry_after_ms: u64 },

    #[error("Call to {service} timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    #[error("Catalog I/O error: {0}")]
    CatalogIo(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
