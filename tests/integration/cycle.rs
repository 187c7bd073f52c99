//! Observation cycles driven end to end through `CycleController`.

use std::sync::Arc;
use std::time::Duration;

use dexarb::config::AppConfig;
use dexarb::engine::cycle::CycleController;
use dexarb::engine::executor::ChannelSink;
use dexarb::engine::rate_limit::Usage;
use dexarb::storage;

use crate::mock_exchange::{adapters, MockExchange};

fn temp_catalog() -> String {
    std::env::temp_dir()
        .join(format!("dexarb_it_catalog_{}.json", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string()
}

fn config(catalog_path: &str, limit: i64, window_ms: u64, defer: &str) -> AppConfig {
    let toml = format!(
        r#"
        [agent]
        name = "dexarb-it"
        scan_interval_secs = 1

        [chain]
        id = "eth"
        chain_id = 1

        [provider]
        backend = "snapshot"
        snapshot_path = "unused.json"
        request_timeout_secs = 5

        [detection]
        price_threshold_usd = 20.0

        [catalog]
        path = "{catalog_path}"
        token_list_dir = "unused"

        [rate_limit]
        limit = {limit}
        window_ms = {window_ms}
        defer = "{defer}"

        [[exchanges]]
        id = "uni"
        token_list_url = "http://127.0.0.1:9/uni.json"
        provider_exchange = "uniswapv2"

        [[exchanges]]
        id = "sushi"
        token_list_url = "http://127.0.0.1:9/sushi.json"
        provider_exchange = "sushiswapv2"
        "#
    );
    AppConfig::from_toml(&toml).unwrap()
}

/// FOO is 25 USD cheaper on uni; BAR pools make it a profitable loan.
fn arbitrage_market() -> (Arc<MockExchange>, Arc<MockExchange>) {
    let uni = Arc::new(MockExchange::new("uni", &["FOO", "BAR", "UNI"]));
    uni.set_price("FOO", 100.0);
    uni.set_price("BAR", 1.0);
    uni.set_ratio("BAR", "FOO", 10.0, 8.0);

    let sushi = Arc::new(MockExchange::new("sushi", &["FOO", "BAR", "SUSHI"]));
    sushi.set_price("FOO", 125.0);
    sushi.set_price("BAR", 1.0);
    sushi.set_ratio("FOO", "BAR", 5.0, 6.0);

    (uni, sushi)
}

#[tokio::test]
async fn test_cycle_publishes_flash_loan_candidate() {
    let path = temp_catalog();
    let cfg = config(&path, 100, 60_000, "wait");
    let (uni, sushi) = arbitrage_market();
    let (sink, mut rx) = ChannelSink::new(8);
    let mut controller =
        CycleController::from_config(&cfg, adapters(&[&uni, &sushi]), Arc::new(sink));

    let report = controller.execute_observation_cycle().await.unwrap();

    assert_eq!(report.tokens_scanned, 2);
    assert_eq!(report.differences_found, 1);
    assert_eq!(report.candidates_published, 1);
    assert!(!report.partial);

    let batch = rx.recv().await.unwrap();
    let candidate = &batch[0];
    assert_eq!(candidate.token, "FOO");
    assert_eq!(candidate.exchange_low, "uni");
    assert_eq!(candidate.exchange_high, "sushi");
    assert!((candidate.spread - 25.0).abs() < 1e-9);
    assert_eq!(candidate.flash_loan_tokens.len(), 1);
    assert_eq!(candidate.flash_loan_tokens[0].symbol, "BAR");
    assert!((candidate.flash_loan_tokens[0].estimated_profit - 26.0).abs() < 1e-9);

    // single-exchange tokens are never priced
    assert_eq!(uni.price_calls(), 2);

    storage::delete_catalog(Some(&path)).unwrap();
}

#[tokio::test]
async fn test_catalog_merged_once_and_file_stable() {
    let path = temp_catalog();
    let cfg = config(&path, 100, 60_000, "wait");
    let (uni, sushi) = arbitrage_market();
    let (sink, _rx) = ChannelSink::new(8);
    let mut controller =
        CycleController::from_config(&cfg, adapters(&[&uni, &sushi]), Arc::new(sink));

    controller.execute_observation_cycle().await.unwrap();
    let first = std::fs::read(&path).unwrap();
    controller.execute_observation_cycle().await.unwrap();

    assert_eq!(uni.catalog_calls(), 1);
    assert_eq!(std::fs::read(&path).unwrap(), first);

    // re-merging unchanged listings leaves the file untouched
    controller.invalidate_catalog();
    controller.execute_observation_cycle().await.unwrap();
    assert_eq!(uni.catalog_calls(), 2);
    assert_eq!(std::fs::read(&path).unwrap(), first);

    let text = String::from_utf8(first).unwrap();
    assert!(text.contains("\"supportedExchanges\""));
    assert!(text.contains("\n  \"BAR\""));

    storage::delete_catalog(Some(&path)).unwrap();
}

#[tokio::test]
async fn test_prices_rescanned_every_cycle() {
    let path = temp_catalog();
    let cfg = config(&path, 100, 60_000, "wait");
    let (uni, sushi) = arbitrage_market();
    sushi.set_price("FOO", 100.0);

    let (sink, mut rx) = ChannelSink::new(8);
    let mut controller =
        CycleController::from_config(&cfg, adapters(&[&uni, &sushi]), Arc::new(sink));

    let quiet = controller.execute_observation_cycle().await.unwrap();
    assert_eq!(quiet.differences_found, 0);
    assert!(rx.recv().await.unwrap().is_empty());

    sushi.set_price("FOO", 125.0);
    let busy = controller.execute_observation_cycle().await.unwrap();
    assert_eq!(busy.candidates_published, 1);
    assert_eq!(rx.recv().await.unwrap().len(), 1);

    storage::delete_catalog(Some(&path)).unwrap();
}

#[tokio::test]
async fn test_failing_exchange_does_not_abort_cycle() {
    let path = temp_catalog();
    let cfg = config(&path, 100, 60_000, "wait");
    let (uni, sushi) = arbitrage_market();
    let (sink, _rx) = ChannelSink::new(8);
    let mut controller =
        CycleController::from_config(&cfg, adapters(&[&uni, &sushi]), Arc::new(sink));

    controller.execute_observation_cycle().await.unwrap();
    sushi.set_error("rpc node unreachable");

    let report = controller.execute_observation_cycle().await.unwrap();
    assert_eq!(report.prices_fetched, 2);
    assert_eq!(report.differences_found, 0);
    assert_eq!(report.candidates_published, 0);

    storage::delete_catalog(Some(&path)).unwrap();
}

#[tokio::test]
async fn test_reject_policy_drops_calls_over_budget() {
    let path = temp_catalog();
    let cfg = config(&path, 2, 60_000, "reject");

    let uni = Arc::new(MockExchange::new("uni", &["AAA", "BBB", "CCC"]));
    let sushi = Arc::new(MockExchange::new("sushi", &["AAA", "BBB", "CCC"]));
    for mock in [&uni, &sushi] {
        for symbol in ["AAA", "BBB", "CCC"] {
            mock.set_price(symbol, 1.0);
        }
    }

    let (sink, _rx) = ChannelSink::new(8);
    let mut controller =
        CycleController::from_config(&cfg, adapters(&[&uni, &sushi]), Arc::new(sink));

    let report = controller.execute_observation_cycle().await.unwrap();

    // two of three price calls fit in each exchange's window
    assert_eq!(report.prices_fetched, 4);
    assert_eq!(uni.price_calls(), 2);
    assert_eq!(
        controller.limiter().usage("uni"),
        Some(Usage { limit: 2, used: 2 })
    );

    storage::delete_catalog(Some(&path)).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_policy_defers_until_window_rolls() {
    let path = temp_catalog();
    let cfg = config(&path, 2, 1_000, "wait");

    let uni = Arc::new(MockExchange::new("uni", &["AAA", "BBB", "CCC"]));
    let sushi = Arc::new(MockExchange::new("sushi", &["AAA", "BBB", "CCC"]));
    for mock in [&uni, &sushi] {
        for symbol in ["AAA", "BBB", "CCC"] {
            mock.set_price(symbol, 1.0);
        }
    }

    let (sink, _rx) = ChannelSink::new(8);
    let mut controller =
        CycleController::from_config(&cfg, adapters(&[&uni, &sushi]), Arc::new(sink));

    let started = tokio::time::Instant::now();
    let report = controller.execute_observation_cycle().await.unwrap();

    assert_eq!(report.prices_fetched, 6);
    assert!(started.elapsed() >= Duration::from_millis(1_000));

    storage::delete_catalog(Some(&path)).unwrap();
}
