//! Rate-limited request executor.
//!
//! Every adapter call made by the engine goes through `RateLimiter::execute`,
//! which charges its cost against a rolling per-service budget. One limiter
//! is owned by the cycle controller and shared (via `Arc`) by the scan and
//! optimize phases, so concurrent lookups draw from the same counters.

use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{DeferPolicy, RateLimitConfig};
use crate::types::ArbError;

// ---------------------------------------------------------------------------
// Window state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Window {
    limit: i64,
    used: i64,
    window_start: Instant,
    window_length: Duration,
}

impl Window {
    fn new(cfg: RateLimitConfig) -> Self {
        Self {
            limit: cfg.limit,
            used: 0,
            window_start: Instant::now(),
            window_length: Duration::from_millis(cfg.window_ms),
        }
    }

    fn unmetered(&self) -> bool {
        self.limit < 1
    }
}

/// Outcome of asking for budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Budget exhausted; the window rolls over after `retry_after`.
    Deferred { retry_after: Duration },
    /// The cost alone exceeds the whole budget.
    TooExpensive,
}

/// Snapshot of one service's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub limit: i64,
    pub used: i64,
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

/// Per-service rolling request budgets.
///
/// Services that were never registered pass through unmetered.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    defer: DeferPolicy,
    call_timeout: Option<Duration>,
}

impl RateLimiter {
    pub fn new(defer: DeferPolicy, call_timeout: Option<Duration>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            defer,
            call_timeout,
        }
    }

    /// Install (or replace) the budget for a service.
    pub fn register(&self, service: &str, cfg: RateLimitConfig) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.insert(service.to_string(), Window::new(cfg));
        debug!(service, limit = cfg.limit, window_ms = cfg.window_ms, "Rate limit registered");
    }

    pub fn usage(&self, service: &str) -> Option<Usage> {
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.get(service).map(|w| Usage {
            limit: w.limit,
            used: w.used,
        })
    }

    /// Charge `cost` against the service's budget if it fits.
    ///
    /// The window is rolled over before the check, so a deferred caller
    /// that retries later is re-checked against a fresh window.
    pub fn try_acquire(&self, service: &str, cost: u32) -> Admission {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let Some(window) = windows.get_mut(service) else {
            return Admission::Admitted;
        };

        if window.unmetered() {
            return Admission::Admitted;
        }

        let cost = i64::from(cost);
        if cost > window.limit {
            return Admission::TooExpensive;
        }

        let now = Instant::now();
        if now.duration_since(window.window_start) >= window.window_length {
            window.used = 0;
            window.window_start = now;
        }

        if window.used + cost > window.limit {
            let retry_after = (window.window_start + window.window_length).saturating_duration_since(now);
            return Admission::Deferred { retry_after };
        }

        window.used += cost;
        Admission::Admitted
    }

    /// Run `action` once `cost` units of the service's budget are available.
    ///
    /// Returns `Ok(None)` when the call was rejected by the budget or the
    /// provider answered with an error-shaped payload. Every other failure,
    /// including a call timeout, is forwarded to the caller.
    pub async fn execute<T, F, Fut>(&self, service: &str, cost: u32, action: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            match self.try_acquire(service, cost) {
                Admission::Admitted => break,
                Admission::TooExpensive => {
                    warn!(service, cost, "Request cost exceeds the whole rate limit, dropping");
                    return Ok(None);
                }
                Admission::Deferred { retry_after } => match self.defer {
                    DeferPolicy::Reject => {
                        let reason = ArbError::RateLimited {
                            service: service.to_string(),
                            retry_after_ms: retry_after.as_millis() as u64,
                        };
                        debug!(error = %reason, "Rejecting call");
                        return Ok(None);
                    }
                    DeferPolicy::Wait => {
                        debug!(
                            service,
                            wait_ms = retry_after.as_millis() as u64,
                            "Waiting for rate limit window"
                        );
                        tokio::time::sleep(retry_after).await;
                        debug!(service, "Resuming requests");
                    }
                },
            }
        }

        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, action()).await {
                Ok(result) => result,
                Err(_) => Err(ArbError::Timeout {
                    service: service.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }
                .into()),
            },
            None => action().await,
        };

        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(e) => match e.downcast_ref::<ArbError>() {
                Some(ArbError::MalformedResponse { .. }) => {
                    warn!(service, error = %e, "Provider returned an error response");
                    Ok(None)
                }
                _ => Err(e),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
