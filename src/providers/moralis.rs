//! Moralis Web3 API backend.
//!
//! API docs: https://docs.moralis.io/web3-data-api/evm/reference
//! Base URL: https://deep-index.moralis.io/api/v2
//! Rate limit: plan-dependent, enforced by the engine's `RateLimiter`.
//! Auth: `X-API-Key` header.
//!
//! Error responses come back as `{ "message": "..." }`, sometimes with a
//! 200 status; those are surfaced as `ArbError::MalformedResponse` so the
//! executor can treat them as "no data".

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::ChainDataProvider;
use crate::types::{ArbError, PairReserves};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_BASE_URL: &str = "https://deep-index.moralis.io/api/v2";
const PROVIDER_NAME: &str = "moralis";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPriceResponse {
    usd_price: f64,
    #[serde(default)]
    exchange_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairAddressResponse {
    #[serde(default)]
    pair_address: Option<String>,
}

/// Moralis numbers reserves from zero; we expose them as reserve1/reserve2.
#[derive(Debug, Deserialize)]
struct ReservesResponse {
    reserve0: String,
    reserve1: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct MoralisProvider {
    http: Client,
    api_key: SecretString,
    base_url: String,
    chain: String,
}

impl MoralisProvider {
    pub fn new(
        api_key: SecretString,
        base_url: Option<String>,
        chain: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("dexarb/0.1.0")
            .build()
            .context("Failed to build HTTP client for Moralis")?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            chain,
        })
    }

    // -- Internal helpers ------------------------------------------------

    /// GET a Moralis endpoint. A 404 is "no data"; an error-shaped body
    /// is a `MalformedResponse`.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<T>> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, ?query, "Calling Moralis");

        let resp = self
            .http
            .get(&url)
            .header("X-API-Key", self.api_key.expose_secret())
            .query(query)
            .send()
            .await
            .context("Moralis API request failed")?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url = %url, "Moralis has no data for request");
            return Ok(None);
        }

        let body = resp.text().await.context("Failed to read Moralis response body")?;
        parse_response(status, &body).map(Some)
    }
}

/// Decode a Moralis body, classifying error-shaped payloads.
fn parse_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| ArbError::MalformedResponse {
        service: PROVIDER_NAME.to_string(),
        message: format!("invalid JSON ({status}): {e}"),
    })?;

    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        return Err(ArbError::MalformedResponse {
            service: PROVIDER_NAME.to_string(),
            message: message.to_string(),
        }
        .into());
    }

    if !status.is_success() {
        return Err(ArbError::Adapter {
            exchange: PROVIDER_NAME.to_string(),
            message: format!("HTTP {status}: {body}"),
        }
        .into());
    }

    serde_json::from_value(value).map_err(|e| {
        ArbError::MalformedResponse {
            service: PROVIDER_NAME.to_string(),
            message: format!("unexpected shape: {e}"),
        }
        .into()
    })
}

#[async_trait]
impl ChainDataProvider for MoralisProvider {
    async fn token_price(&self, token_address: &str, exchange: &str) -> Result<Option<f64>> {
        let path = format!("/erc20/{}/price", urlencoding::encode(token_address));
        let resp: Option<TokenPriceResponse> = self
            .get(&path, &[("chain", self.chain.as_str()), ("exchange", exchange)])
            .await?;

        Ok(resp.map(|r| {
            debug!(
                token = token_address,
                exchange = ?r.exchange_name,
                usd_price = r.usd_price,
                "Received token price"
            );
            r.usd_price
        }))
    }

    async fn pair_address(
        &self,
        token0_address: &str,
        token1_address: &str,
        exchange: &str,
    ) -> Result<Option<String>> {
        let path = format!(
            "/{}/{}/pairAddress",
            urlencoding::encode(token0_address),
            urlencoding::encode(token1_address),
        );
        let resp: Option<PairAddressResponse> = self
            .get(&path, &[("chain", self.chain.as_str()), ("exchange", exchange)])
            .await?;

        Ok(resp.and_then(|r| r.pair_address).filter(|a| !a.is_empty()))
    }

    async fn pair_reserves(&self, pair_address: &str) -> Result<Option<PairReserves>> {
        let path = format!("/{}/reserves", urlencoding::encode(pair_address));
        let resp: Option<ReservesResponse> =
            self.get(&path, &[("chain", self.chain.as_str())]).await?;

        Ok(resp.map(|r| PairReserves {
            reserve1: r.reserve0,
            reserve2: r.reserve1,
        }))
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
