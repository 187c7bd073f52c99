//! Price scan cache builder.
//!
//! For every token listed on more than one exchange, fetches the spot USD
//! price on each supporting exchange and records it in a `ScanCache`.
//! Lookups run concurrently through the shared rate limiter; results land
//! in a sorted map, so completion order never affects the cache contents.
//!
//! A cell that already holds a price is not fetched again, and a lookup
//! that yields nothing leaves its cell absent.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::rate_limit::RateLimiter;
use super::{lookup, PRICE_REQUEST_COST};
use crate::exchanges::ExchangeAdapter;
use crate::types::{ExchangeId, MasterCatalog, ScanCache};

/// Result of one scan phase.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub cache: ScanCache,
    /// Lookups issued this phase (memoized cells excluded).
    pub requested: usize,
    /// Lookups that produced a usable price.
    pub fetched: usize,
    /// The deadline expired before every lookup resolved.
    pub partial: bool,
}

pub struct PriceScanner {
    limiter: Arc<RateLimiter>,
    concurrency: usize,
}

impl PriceScanner {
    pub fn new(limiter: Arc<RateLimiter>, concurrency: usize) -> Self {
        Self {
            limiter,
            concurrency: concurrency.max(1),
        }
    }

    /// Scan into a fresh cache.
    pub async fn scan(
        &self,
        catalog: &MasterCatalog,
        adapters: &HashMap<ExchangeId, Arc<dyn ExchangeAdapter>>,
        deadline: Option<Instant>,
    ) -> ScanOutcome {
        self.scan_into(ScanCache::new(), catalog, adapters, deadline)
            .await
    }

    /// Fill the cells of `cache` that are still empty.
    pub async fn scan_into(
        &self,
        mut cache: ScanCache,
        catalog: &MasterCatalog,
        adapters: &HashMap<ExchangeId, Arc<dyn ExchangeAdapter>>,
        deadline: Option<Instant>,
    ) -> ScanOutcome {
        let mut cells: Vec<(String, ExchangeId, Arc<dyn ExchangeAdapter>)> = Vec::new();
        let mut tokens = 0usize;

        for entry in catalog.multi_exchange_tokens() {
            tokens += 1;
            let mut exchanges = entry.supported_exchanges.clone();
            exchanges.sort();

            for exchange in exchanges {
                if cache.contains(&entry.symbol, &exchange) {
                    continue;
                }
                match adapters.get(&exchange) {
                    Some(adapter) => cells.push((entry.symbol.clone(), exchange, adapter.clone())),
                    None => warn!(
                        token = %entry.symbol,
                        exchange = %exchange,
                        "Catalog exchange has no adapter, skipping"
                    ),
                }
            }
        }

        let requested = cells.len();
        debug!(tokens, requested, "Starting price scan");

        let limiter = &self.limiter;
        let mut lookups = stream::iter(cells.into_iter().map(|(symbol, exchange, adapter)| async move {
            let quote = lookup(limiter, &exchange, PRICE_REQUEST_COST, "price", || {
                adapter.get_price(&symbol)
            })
            .await;
            (symbol, exchange, quote)
        }))
        .buffer_unordered(self.concurrency);

        let mut fetched = 0usize;
        let mut partial = false;
        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, lookups.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            resolved = fetched,
                            requested,
                            "Cycle deadline reached during price scan"
                        );
                        partial = true;
                        break;
                    }
                },
                None => lookups.next().await,
            };
            let Some((symbol, exchange, quote)) = next else {
                break;
            };

            match quote {
                Some(q) if q.usd_price.is_finite() && q.usd_price > 0.0 => {
                    cache.record(&symbol, &exchange, q.usd_price);
                    fetched += 1;
                }
                Some(q) => debug!(
                    token = %symbol,
                    exchange = %exchange,
                    price = q.usd_price,
                    "Ignoring unusable price"
                ),
                None => debug!(token = %symbol, exchange = %exchange, "No price, cell left empty"),
            }
        }

        info!(
            tokens,
            requested,
            fetched,
            cells = cache.cell_count(),
            partial,
            "Price scan complete"
        );

        ScanOutcome {
            cache,
            requested,
            fetched,
            partial,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
