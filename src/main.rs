//! DEXARB: cross-DEX arbitrage scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the data provider and exchange adapters, and runs the
//! merge→scan→detect→optimize observation loop with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use dexarb::config;
use dexarb::engine::cycle::{CycleController, CycleReport};
use dexarb::engine::executor::DryRunSink;
use dexarb::exchanges;
use dexarb::providers;
use dexarb::types::ArbError;

const BANNER: &str = r#"
  ____  _______  __   _    ____  ____
 |  _ \| ____\ \/ /  / \  |  _ \| __ )
 | | | |  _|  \  /  / _ \ | |_) |  _ \
 | |_| | |___ /  \ / ___ \|  _ <| |_) |
 |____/|_____/_/\_\_/   \_\_| \_\____/

  Cross-DEX price divergence scanner
  v0.1.0, dry-run execution
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("DEXARB_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        chain = %cfg.chain.id,
        exchanges = cfg.exchanges.len(),
        threshold = cfg.detection.price_threshold_usd,
        "DEXARB starting up"
    );

    // -- Initialise components -------------------------------------------

    let provider = providers::build_provider(&cfg)?;
    let adapters = exchanges::build_exchanges(&cfg, provider)?;

    // Trades are only logged until a real consumer is attached
    let sink = Arc::new(DryRunSink::new());
    let mut controller = CycleController::from_config(&cfg, adapters, sink.clone());

    let run_once = cfg.agent.run_once || std::env::args().any(|a| a == "--once");
    if run_once {
        let report = controller.execute_observation_cycle().await?;
        log_cycle_report(&report);
        return Ok(());
    }

    // -- Main loop -------------------------------------------------------

    let scan_interval = Duration::from_secs(cfg.agent.scan_interval_secs.max(1));
    let mut interval = tokio::time::interval(scan_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = scan_interval.as_secs(),
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match controller.execute_observation_cycle().await {
                    Ok(report) => log_cycle_report(&report),
                    Err(e) if is_fatal(&e) => {
                        error!(error = %e, "Catalog I/O failed, stopping");
                        return Err(e);
                    }
                    Err(e) => {
                        error!(error = %e, "Cycle failed, continuing to next");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(published = sink.published(), "DEXARB shut down cleanly.");
    Ok(())
}

/// Errors that stop the process rather than the cycle.
fn is_fatal(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<ArbError>(), Some(ArbError::CatalogIo(_)))
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle_number,
        cycle_id = %report.cycle_id,
        tokens = report.tokens_scanned,
        prices = report.prices_fetched,
        differences = report.differences_found,
        published = report.candidates_published,
        partial = report.partial,
        elapsed_ms = report.elapsed_ms,
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dexarb=info"));

    let json_logging = std::env::var("DEXARB_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
