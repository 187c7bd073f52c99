//! Execution consumer seam.
//!
//! The engine publishes each cycle's surviving candidates, with their
//! flash-loan options attached, to one `ExecutionSink`. Building and
//! submitting transactions is the consumer's job; this crate only ships a
//! queue-backed sink and a dry-run sink that logs what would be traded.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

use crate::types::DifferenceCandidate;

#[async_trait]
pub trait ExecutionSink: Send + Sync {
    fn name(&self) -> &str;

    /// Hand over one cycle's candidates. Called once per cycle, possibly
    /// with an empty batch.
    async fn publish(&self, candidates: &[DifferenceCandidate]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Channel sink
// ---------------------------------------------------------------------------

/// Forwards each batch over a bounded tokio channel. A full channel drops
/// the batch rather than waiting for the consumer.
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<DifferenceCandidate>>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Vec<DifferenceCandidate>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ExecutionSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn publish(&self, candidates: &[DifferenceCandidate]) -> Result<()> {
        match self.tx.try_send(candidates.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(
                    dropped = candidates.len(),
                    capacity = self.tx.max_capacity(),
                    "Execution consumer is not draining, batch dropped"
                );
                Err(anyhow!("execution queue is full"))
            }
            Err(TrySendError::Closed(_)) => Err(anyhow!("execution consumer has hung up")),
        }
    }
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Logs every candidate and option instead of trading.
#[derive(Default)]
pub struct DryRunSink {
    published: AtomicUsize,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates published over the sink's lifetime.
    pub fn published(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExecutionSink for DryRunSink {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn publish(&self, candidates: &[DifferenceCandidate]) -> Result<()> {
        if candidates.is_empty() {
            info!("[DRY RUN] No candidates this cycle");
            return Ok(());
        }

        for candidate in candidates {
            info!(
                token = %candidate.token,
                buy_on = %candidate.exchange_low,
                sell_on = %candidate.exchange_high,
                spread = format!("${:.4}", candidate.spread),
                options = candidate.flash_loan_tokens.len(),
                "[DRY RUN] Would execute flash-loan arbitrage"
            );
            for option in &candidate.flash_loan_tokens {
                info!(
                    token = %candidate.token,
                    borrow = %option.symbol,
                    ratio_low = %option.ratio_on_low,
                    ratio_high = %option.ratio_on_high,
                    profit = format!("${:.4}", option.estimated_profit),
                    "[DRY RUN]   flash-loan option"
                );
            }
        }

        self.published.fetch_add(candidates.len(), Ordering::Relaxed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
