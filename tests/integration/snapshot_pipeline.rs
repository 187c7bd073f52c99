//! The real DEX adapter over recorded chain data: token-list resolution,
//! reserve ordering and decimal scaling all feed the flash-loan estimate.

use std::sync::Arc;
use std::time::Duration;

use dexarb::config::{DeferPolicy, RateLimitConfig};
use dexarb::engine::cycle::{CycleController, CycleSettings};
use dexarb::engine::executor::{ChannelSink, DryRunSink};
use dexarb::engine::rate_limit::RateLimiter;
use dexarb::exchanges::dex::DexExchange;
use dexarb::exchanges::ExchangeAdapter;
use dexarb::providers::snapshot::SnapshotProvider;
use dexarb::providers::ChainDataProvider;
use dexarb::storage;
use dexarb::types::{TokenInfo, TokenList};

const FOO: &str = "0x1111111111111111111111111111111111111111";
const BAR: &str = "0x2222222222222222222222222222222222222222";
const USDC: &str = "0x3333333333333333333333333333333333333333";

const SNAPSHOT: &str = r#"{
    "prices": {
        "uniswapv2": {
            "0x1111111111111111111111111111111111111111": 100.0,
            "0x2222222222222222222222222222222222222222": 1.0,
            "0x3333333333333333333333333333333333333333": 1.0
        },
        "sushiswapv2": {
            "0x1111111111111111111111111111111111111111": 125.0,
            "0x2222222222222222222222222222222222222222": 1.0,
            "0x3333333333333333333333333333333333333333": 1.0
        }
    },
    "pairs": {
        "uniswapv2": {
            "0x2222222222222222222222222222222222222222:0x1111111111111111111111111111111111111111": "0xUNIPAIR"
        },
        "sushiswapv2": {
            "0x1111111111111111111111111111111111111111:0x2222222222222222222222222222222222222222": "0xSUSHIPAIR"
        }
    },
    "reserves": {
        "0xunipair": { "reserve1": "10000000000000000000", "reserve2": "2000000000" },
        "0xsushipair": { "reserve1": "8000000000000000000", "reserve2": "1000000000" }
    }
}"#;

fn token_list() -> TokenList {
    let token = |symbol: &str, address: &str, decimals: u8| TokenInfo {
        symbol: symbol.into(),
        address: address.into(),
        decimals,
        chain_id: Some(1),
        name: None,
    };
    TokenList {
        name: "recorded".into(),
        tokens: vec![
            token("FOO", FOO, 18),
            token("BAR", BAR, 6),
            token("USDC", USDC, 6),
        ],
        last_updated_timestamp: None,
    }
}

fn exchanges() -> Vec<Arc<dyn ExchangeAdapter>> {
    let provider: Arc<dyn ChainDataProvider> = Arc::new(SnapshotProvider::from_json(SNAPSHOT).unwrap());
    vec![
        Arc::new(DexExchange::with_token_list("uni", "uniswapv2", token_list(), provider.clone())),
        Arc::new(DexExchange::with_token_list("sushi", "sushiswapv2", token_list(), provider)),
    ]
}

fn limiter() -> Arc<RateLimiter> {
    let limiter = RateLimiter::new(DeferPolicy::Wait, Some(Duration::from_secs(5)));
    for id in ["uni", "sushi"] {
        limiter.register(id, RateLimitConfig { limit: 500, window_ms: 60_000 });
    }
    Arc::new(limiter)
}

fn settings(threshold: f64) -> CycleSettings {
    CycleSettings {
        catalog_path: std::env::temp_dir()
            .join(format!("dexarb_it_snapshot_{}.json", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string(),
        price_threshold_usd: threshold,
        gas_cost_usd: 0.0,
        concurrency: 4,
        cycle_deadline: None,
        refresh_catalog_on_start: true,
    }
}

#[tokio::test]
async fn test_recorded_market_yields_scaled_flash_loan_option() {
    let s = settings(20.0);
    let path = s.catalog_path.clone();
    let (sink, mut rx) = ChannelSink::new(4);
    let mut controller = CycleController::new(exchanges(), limiter(), Arc::new(sink), s);

    let report = controller.execute_observation_cycle().await.unwrap();
    assert_eq!(report.tokens_scanned, 3);
    assert_eq!(report.prices_fetched, 6);
    assert_eq!(report.differences_found, 1);

    let batch = rx.recv().await.unwrap();
    assert_eq!(batch.len(), 1);
    let candidate = &batch[0];
    assert_eq!(candidate.token, "FOO");
    assert_eq!(candidate.exchange_low, "uni");
    assert_eq!(candidate.exchange_high, "sushi");

    // USDC has no pools, so BAR is the only instrument
    assert_eq!(candidate.flash_loan_tokens.len(), 1);
    let option = &candidate.flash_loan_tokens[0];
    assert_eq!(option.symbol, "BAR");

    // uni: 2000 BAR * $1 against 10 FOO * $100
    assert!((option.ratio_on_low.numerator - 2000.0).abs() < 1e-6);
    assert!((option.ratio_on_low.denominator - 1000.0).abs() < 1e-6);
    // sushi: 8 FOO * $125 against 1000 BAR * $1
    assert!((option.ratio_on_high.numerator - 1000.0).abs() < 1e-6);
    assert!((option.ratio_on_high.denominator - 1000.0).abs() < 1e-6);
    assert!((option.estimated_profit - 1025.0).abs() < 1e-6);

    storage::delete_catalog(Some(&path)).unwrap();
}

#[tokio::test]
async fn test_spread_below_threshold_publishes_nothing() {
    let s = settings(30.0);
    let path = s.catalog_path.clone();
    let sink = Arc::new(DryRunSink::new());
    let mut controller = CycleController::new(exchanges(), limiter(), sink.clone(), s);

    let report = controller.execute_observation_cycle().await.unwrap();
    assert_eq!(report.differences_found, 0);
    assert_eq!(report.candidates_published, 0);
    assert_eq!(sink.published(), 0);

    storage::delete_catalog(Some(&path)).unwrap();
}
