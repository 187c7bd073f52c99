//! Difference detector.
//!
//! Walks the scan cache in sorted symbol order and compares every unordered
//! pair of exchanges that priced the same token. Pairs are generated with
//! `i < j` over the sorted exchange list, so each pair is checked exactly
//! once per token.

use tracing::{debug, info};

use crate::types::{DifferenceCandidate, ScanCache};

/// Emit a candidate for every exchange pair whose price gap is at least
/// `threshold`. Exactly equal prices never produce a candidate.
pub fn detect(cache: &ScanCache, threshold: f64) -> Vec<DifferenceCandidate> {
    let mut candidates = Vec::new();
    let mut pairs_checked = 0usize;

    for (symbol, record) in cache.iter() {
        // BTreeMap iteration gives the sorted exchange order
        let priced: Vec<(&String, f64)> = record
            .exchanges
            .iter()
            .map(|(exchange, quote)| (exchange, quote.usd_price))
            .collect();

        if priced.len() < 2 {
            debug!(token = %symbol, exchanges = priced.len(), "Not enough prices to compare");
            continue;
        }

        for i in 0..priced.len() {
            for j in (i + 1)..priced.len() {
                pairs_checked += 1;
                let (exchange_a, price_a) = priced[i];
                let (exchange_b, price_b) = priced[j];

                if price_a == price_b {
                    continue;
                }
                let ((exchange_low, price_low), (exchange_high, price_high)) = if price_a < price_b {
                    ((exchange_a, price_a), (exchange_b, price_b))
                } else {
                    ((exchange_b, price_b), (exchange_a, price_a))
                };

                let spread = price_high - price_low;
                if spread < threshold {
                    continue;
                }

                debug!(
                    token = %symbol,
                    low = %exchange_low,
                    high = %exchange_high,
                    spread = format!("${spread:.4}"),
                    "Price difference found"
                );
                candidates.push(DifferenceCandidate {
                    token: symbol.clone(),
                    exchange_low: exchange_low.clone(),
                    exchange_high: exchange_high.clone(),
                    price_low,
                    price_high,
                    spread,
                    flash_loan_tokens: Vec::new(),
                });
            }
        }
    }

    info!(
        tokens = cache.len(),
        pairs_checked,
        differences = candidates.len(),
        threshold,
        "Difference detection complete"
    );
    candidates
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
