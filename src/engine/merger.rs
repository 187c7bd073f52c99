//! Catalog merger.
//!
//! Unions every exchange's token list into the master catalog keyed by
//! symbol, recording which exchanges list each token. Exchanges that fail
//! to return a list are skipped; the merge itself never fails on them.

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::exchanges::ExchangeAdapter;
use crate::storage;
use crate::types::MasterCatalog;

/// Fetch every adapter's catalog and fold them into one master catalog.
///
/// Lists are fetched concurrently but folded in adapter order, so the
/// `supported_exchanges` order is deterministic.
pub async fn merge_catalogs(adapters: &[Arc<dyn ExchangeAdapter>]) -> MasterCatalog {
    let lists = join_all(adapters.iter().map(|a| a.get_catalog())).await;

    let mut catalog = MasterCatalog::new();
    for (adapter, list) in adapters.iter().zip(lists) {
        let list = match list {
            Ok(list) => list,
            Err(e) => {
                warn!(exchange = %adapter.id(), error = %e, "Token list unavailable, skipping exchange");
                continue;
            }
        };

        let mut added = 0usize;
        for token in &list.tokens {
            if catalog.insert_listing(&token.symbol, adapter.id()) {
                added += 1;
            }
        }
        debug!(
            exchange = %adapter.id(),
            listed = list.tokens.len(),
            added,
            "Folded exchange catalog"
        );
    }

    info!(
        tokens = catalog.len(),
        multi_exchange = catalog.multi_exchange_tokens().count(),
        "Catalog merge complete"
    );
    catalog
}

/// Merge and persist; the file is rewritten only if its content changed.
///
/// An empty merge (every exchange down) never overwrites the saved file.
pub async fn merge_and_persist(
    adapters: &[Arc<dyn ExchangeAdapter>],
    path: &str,
) -> Result<MasterCatalog> {
    let catalog = merge_catalogs(adapters).await;
    if catalog.is_empty() {
        warn!(path, "No exchange returned a token list, not persisting");
        return Ok(catalog);
    }
    storage::persist_catalog(&catalog, Some(path))?;
    Ok(catalog)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
