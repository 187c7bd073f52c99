//! Core engine: the merge → scan → detect → optimize observation cycle.

pub mod rate_limit;
pub mod merger;
pub mod scanner;
pub mod detector;
pub mod optimizer;
pub mod executor;
pub mod cycle;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use std::future::Future;
use tracing::{debug, warn};

use rate_limit::RateLimiter;

// Request weights charged against an exchange's budget.
pub const PRICE_REQUEST_COST: u32 = 1;
pub const PAIR_ADDRESS_REQUEST_COST: u32 = 1;
pub const RESERVES_REQUEST_COST: u32 = 1;
/// A ratio needs the USD price of both tokens.
pub const RATIO_REQUEST_COST: u32 = 2;

/// Run one adapter lookup through the limiter, collapsing every kind of
/// "no data" (absent, deferred, error-shaped, failed) into `None`.
pub(crate) async fn lookup<T, F, Fut>(
    limiter: &RateLimiter,
    exchange: &str,
    cost: u32,
    what: &str,
    action: F,
) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    match limiter.execute(exchange, cost, action).await {
        Ok(Some(Some(value))) => Some(value),
        Ok(Some(None)) => {
            debug!(exchange, what, "No data");
            None
        }
        Ok(None) => {
            debug!(exchange, what, "Lookup deferred or rejected");
            None
        }
        Err(e) => {
            warn!(exchange, what, error = %e, "Lookup failed");
            None
        }
    }
}
