//! Liquidity-based flash-loan (LBFL) optimizer.
//!
//! For every difference candidate, tries each other catalog token listed on
//! both of the candidate's exchanges as the borrowed instrument. The pool
//! ratio on the cheap side (instrument → token) and on the expensive side
//! (token → instrument) adjust the spread into a profit estimate:
//!
//! ```text
//! profit = spread
//!        + (ratio_low.numerator  - ratio_low.denominator)
//!        + (ratio_high.numerator - ratio_high.denominator)
//!        - gas_cost_usd
//! ```
//!
//! Instruments with a negative estimate, or without a pair or reserves on
//! either side, are dropped. Candidates left with no instrument are dropped.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::rate_limit::RateLimiter;
use super::{lookup, PAIR_ADDRESS_REQUEST_COST, RATIO_REQUEST_COST, RESERVES_REQUEST_COST};
use crate::exchanges::ExchangeAdapter;
use crate::types::{DifferenceCandidate, ExchangeId, FlashloanOption, MasterCatalog, Ratio};

/// Result of one optimize phase.
#[derive(Debug, Clone, Default)]
pub struct OptimizeOutcome {
    /// Candidates with at least one profitable instrument.
    pub candidates: Vec<DifferenceCandidate>,
    pub instruments_checked: usize,
    /// The deadline expired before every instrument was evaluated.
    pub partial: bool,
}

/// `(candidate index, candidate token, instrument, low adapter, high adapter)`
type Job = (
    usize,
    String,
    String,
    Arc<dyn ExchangeAdapter>,
    Arc<dyn ExchangeAdapter>,
);

pub struct FlashloanOptimizer {
    limiter: Arc<RateLimiter>,
    concurrency: usize,
    gas_cost_usd: f64,
}

impl FlashloanOptimizer {
    pub fn new(limiter: Arc<RateLimiter>, concurrency: usize, gas_cost_usd: f64) -> Self {
        Self {
            limiter,
            concurrency: concurrency.max(1),
            gas_cost_usd,
        }
    }

    pub fn estimate_profit(&self, spread: f64, ratio_low: &Ratio, ratio_high: &Ratio) -> f64 {
        spread + ratio_low.imbalance() + ratio_high.imbalance() - self.gas_cost_usd
    }

    /// Attach flash-loan options to each candidate and drop the ones left
    /// without any. Options keep the catalog's sorted instrument order.
    pub async fn optimize(
        &self,
        mut candidates: Vec<DifferenceCandidate>,
        catalog: &MasterCatalog,
        adapters: &HashMap<ExchangeId, Arc<dyn ExchangeAdapter>>,
        deadline: Option<Instant>,
    ) -> OptimizeOutcome {
        let mut jobs: Vec<Job> = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let (Some(low), Some(high)) = (
                adapters.get(&candidate.exchange_low),
                adapters.get(&candidate.exchange_high),
            ) else {
                warn!(
                    token = %candidate.token,
                    low = %candidate.exchange_low,
                    high = %candidate.exchange_high,
                    "Candidate exchange has no adapter, skipping"
                );
                continue;
            };

            for instrument in
                catalog.listed_on_both(&candidate.exchange_low, &candidate.exchange_high, &candidate.token)
            {
                jobs.push((
                    index,
                    candidate.token.clone(),
                    instrument.symbol.clone(),
                    low.clone(),
                    high.clone(),
                ));
            }
        }

        let instruments_checked = jobs.len();
        debug!(candidates = candidates.len(), instruments_checked, "Starting flash-loan optimization");

        let limiter = &self.limiter;
        let evaluate = |(index, token, instrument, low, high): Job| async move {
            let ratio_low = pair_ratio(limiter, &*low, &instrument, &token).await;
            let ratio_high = match ratio_low {
                Some(_) => pair_ratio(limiter, &*high, &token, &instrument).await,
                None => None,
            };
            (index, instrument, ratio_low.zip(ratio_high))
        };
        let mut evaluations = stream::iter(jobs.into_iter().map(evaluate)).buffered(self.concurrency);

        let mut partial = false;
        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, evaluations.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("Cycle deadline reached during flash-loan optimization");
                        partial = true;
                        break;
                    }
                },
                None => evaluations.next().await,
            };
            let Some((index, instrument, ratios)) = next else {
                break;
            };

            let candidate = &mut candidates[index];
            let Some((ratio_low, ratio_high)) = ratios else {
                debug!(
                    token = %candidate.token,
                    instrument = %instrument,
                    "No pair or reserves for instrument, skipping"
                );
                continue;
            };

            let estimated_profit = self.estimate_profit(candidate.spread, &ratio_low, &ratio_high);
            if estimated_profit >= 0.0 {
                debug!(
                    token = %candidate.token,
                    instrument = %instrument,
                    profit = format!("${estimated_profit:.4}"),
                    "Flash-loan option kept"
                );
                candidate.flash_loan_tokens.push(FlashloanOption {
                    symbol: instrument,
                    ratio_on_low: ratio_low,
                    ratio_on_high: ratio_high,
                    estimated_profit,
                });
            } else {
                debug!(
                    token = %candidate.token,
                    instrument = %instrument,
                    profit = format!("${estimated_profit:.4}"),
                    "Flash-loan option unprofitable, dropped"
                );
            }
        }

        let before = candidates.len();
        candidates.retain(|c| !c.flash_loan_tokens.is_empty());

        info!(
            candidates_in = before,
            candidates_out = candidates.len(),
            instruments_checked,
            partial,
            "Flash-loan optimization complete"
        );

        OptimizeOutcome {
            candidates,
            instruments_checked,
            partial,
        }
    }
}

/// Pool ratio for `token_a`/`token_b` on one exchange: pair address, then
/// reserves, then the ratio itself.
async fn pair_ratio(
    limiter: &RateLimiter,
    adapter: &dyn ExchangeAdapter,
    token_a: &str,
    token_b: &str,
) -> Option<Ratio> {
    let exchange = adapter.id();
    let pair = lookup(limiter, exchange, PAIR_ADDRESS_REQUEST_COST, "pair address", || {
        adapter.get_pair_address(token_a, token_b)
    })
    .await?;
    let reserves = lookup(limiter, exchange, RESERVES_REQUEST_COST, "reserves", || {
        adapter.get_pair_reserves(&pair)
    })
    .await?;
    lookup(limiter, exchange, RATIO_REQUEST_COST, "ratio", || {
        adapter.get_ratio(token_a, token_b, &reserves)
    })
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
