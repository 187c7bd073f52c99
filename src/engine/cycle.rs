//! Observation cycle controller.
//!
//! Owns the exchange adapters, the shared rate limiter, and the execution
//! sink, and runs one cycle as four sequential phases:
//!
//! 1. catalog: reuse the in-memory catalog, else load (and reconcile) the
//!    saved one, else merge from the exchanges
//! 2. scan: price every multi-exchange token on each of its exchanges
//! 3. detect: find exchange pairs whose prices differ by the threshold
//! 4. optimize: attach profitable flash-loan instruments, then publish
//!
//! Only catalog file I/O fails a cycle; everything else degrades to "no
//! data" for the affected cell or instrument.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::detector;
use super::executor::ExecutionSink;
use super::merger;
use super::optimizer::FlashloanOptimizer;
use super::rate_limit::RateLimiter;
use super::scanner::PriceScanner;
use crate::config::AppConfig;
use crate::exchanges::ExchangeAdapter;
use crate::storage;
use crate::types::{ExchangeId, MasterCatalog};

// ---------------------------------------------------------------------------
// Settings and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub catalog_path: String,
    pub price_threshold_usd: f64,
    pub gas_cost_usd: f64,
    pub concurrency: usize,
    pub cycle_deadline: Option<Duration>,
    /// Ignore the saved catalog until the first merge.
    pub refresh_catalog_on_start: bool,
}

impl CycleSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            catalog_path: cfg.catalog.path.clone(),
            price_threshold_usd: cfg.detection.price_threshold_usd,
            gas_cost_usd: cfg.detection.gas_cost_usd,
            concurrency: cfg.detection.concurrency,
            cycle_deadline: cfg.detection.cycle_deadline(),
            refresh_catalog_on_start: cfg.catalog.refresh_on_start,
        }
    }
}

/// Summary of one observation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    pub tokens_scanned: usize,
    pub prices_fetched: usize,
    pub differences_found: usize,
    pub candidates_published: usize,
    /// The deadline cut the scan or optimize phase short.
    pub partial: bool,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct CycleController {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    by_id: HashMap<ExchangeId, Arc<dyn ExchangeAdapter>>,
    limiter: Arc<RateLimiter>,
    scanner: PriceScanner,
    optimizer: FlashloanOptimizer,
    sink: Arc<dyn ExecutionSink>,
    settings: CycleSettings,
    catalog: Option<Arc<MasterCatalog>>,
    /// Whether the saved catalog may be used instead of merging.
    trust_saved_catalog: bool,
    cycles: u64,
}

impl CycleController {
    pub fn new(
        adapters: Vec<Arc<dyn ExchangeAdapter>>,
        limiter: Arc<RateLimiter>,
        sink: Arc<dyn ExecutionSink>,
        settings: CycleSettings,
    ) -> Self {
        let by_id = adapters
            .iter()
            .map(|a| (a.id().to_string(), a.clone()))
            .collect();

        Self {
            scanner: PriceScanner::new(limiter.clone(), settings.concurrency),
            optimizer: FlashloanOptimizer::new(
                limiter.clone(),
                settings.concurrency,
                settings.gas_cost_usd,
            ),
            trust_saved_catalog: !settings.refresh_catalog_on_start,
            adapters,
            by_id,
            limiter,
            sink,
            settings,
            catalog: None,
            cycles: 0,
        }
    }

    /// Wire a controller from configuration: one rate-limit budget per
    /// exchange id, calls bounded by the provider request timeout.
    pub fn from_config(
        cfg: &AppConfig,
        adapters: Vec<Arc<dyn ExchangeAdapter>>,
        sink: Arc<dyn ExecutionSink>,
    ) -> Self {
        let call_timeout =
            (cfg.provider.request_timeout_secs > 0).then(|| cfg.provider.request_timeout());
        let limiter = Arc::new(RateLimiter::new(cfg.rate_limit.defer, call_timeout));
        for exchange in &cfg.exchanges {
            limiter.register(&exchange.id, cfg.rate_limit_for(exchange));
        }

        Self::new(adapters, limiter, sink, CycleSettings::from_config(cfg))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The catalog the next cycle will use, if one is loaded.
    pub fn catalog(&self) -> Option<Arc<MasterCatalog>> {
        self.catalog.clone()
    }

    /// Drop the catalog; the next cycle merges from the exchanges again.
    pub fn invalidate_catalog(&mut self) {
        info!("Catalog invalidated, next cycle will re-merge");
        self.catalog = None;
        self.trust_saved_catalog = false;
    }

    /// Return the catalog for this cycle, loading or merging it if needed.
    pub async fn ensure_catalog(&mut self) -> Result<Arc<MasterCatalog>> {
        if let Some(catalog) = &self.catalog {
            return Ok(catalog.clone());
        }

        let path = self.settings.catalog_path.clone();

        if self.trust_saved_catalog {
            if let Some(mut saved) = storage::load_catalog(Some(&path))? {
                let known: Vec<ExchangeId> = self.adapters.iter().map(|a| a.id().to_string()).collect();
                let corrections = saved.reconcile(&known);
                if corrections > 0 {
                    warn!(corrections, "Saved catalog was inconsistent, rewriting");
                    storage::persist_catalog(&saved, Some(&path))?;
                }
                if !saved.is_empty() {
                    let catalog = Arc::new(saved);
                    self.catalog = Some(catalog.clone());
                    return Ok(catalog);
                }
            }
        }

        let merged = merger::merge_and_persist(&self.adapters, &path).await?;
        if merged.is_empty() {
            // retry the merge next cycle
            return Ok(Arc::new(merged));
        }

        self.trust_saved_catalog = true;
        let catalog = Arc::new(merged);
        self.catalog = Some(catalog.clone());
        Ok(catalog)
    }

    /// Run catalog → scan → detect → optimize and publish the survivors.
    pub async fn execute_observation_cycle(&mut self) -> Result<CycleReport> {
        self.cycles += 1;
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let deadline = self.settings.cycle_deadline.map(|d| clock + d);

        info!(cycle = self.cycles, %cycle_id, "Starting observation cycle");

        // 1. Catalog
        let catalog = self.ensure_catalog().await?;

        // 2. Scan
        let scan = self.scanner.scan(&catalog, &self.by_id, deadline).await;

        // 3. Detect
        let differences = detector::detect(&scan.cache, self.settings.price_threshold_usd);
        let differences_found = differences.len();

        // 4. Optimize and publish
        let optimized = self
            .optimizer
            .optimize(differences, &catalog, &self.by_id, deadline)
            .await;

        let candidates_published = match self.sink.publish(&optimized.candidates).await {
            Ok(()) => optimized.candidates.len(),
            Err(e) => {
                error!(sink = self.sink.name(), error = %e, "Failed to publish candidates");
                0
            }
        };

        Ok(CycleReport {
            cycle_id,
            cycle_number: self.cycles,
            started_at,
            tokens_scanned: scan.cache.len(),
            prices_fetched: scan.fetched,
            differences_found,
            candidates_published,
            partial: scan.partial || optimized.partial,
            elapsed_ms: clock.elapsed().as_millis() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
