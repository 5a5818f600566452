use std::collections::BTreeSet;
use std::time::Duration;

use log::{debug, warn};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::api::{Quote, QuoteBatch, QuoteProvider};
use crate::error::{Result, StockWatchError};

pub const YAHOO_SPARK_URL: &str = "https://query1.finance.yahoo.com/v7/finance/spark";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

#[derive(Debug, Deserialize)]
struct SparkEnvelope {
    spark: SparkBody,
}

#[derive(Debug, Deserialize)]
struct SparkBody {
    result: Option<Vec<SparkResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SparkResult {
    symbol: String,
    #[serde(default)]
    response: Vec<SparkResponse>,
}

#[derive(Debug, Deserialize)]
struct SparkResponse {
    meta: SparkMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SparkMeta {
    regular_market_price: Option<f64>,
    previous_close: Option<f64>, // Regular session close of the prior day
    chart_previous_close: Option<f64>, // Close before the first bar of the range
}

impl SparkMeta {
    fn quote(&self) -> Option<Quote> {
        let price = self.regular_market_price.and_then(Decimal::from_f64)?;
        let prior_close = self
            .previous_close
            .or(self.chart_previous_close)
            .and_then(Decimal::from_f64)?;
        Some(Quote { price, prior_close })
    }
}

/// Batched quote lookups against the Yahoo Finance spark endpoint.
#[derive(Clone)]
pub struct YahooClient {
    client: reqwest::Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl QuoteProvider for YahooClient {
    async fn fetch(&self, symbols: &BTreeSet<String>) -> Result<QuoteBatch> {
        if symbols.is_empty() {
            return Ok(QuoteBatch::new());
        }

        let joined = symbols.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        debug!("Requesting quotes for {}", joined);

        let body = self
            .client
            .get(&self.base_url)
            .query(&[("symbols", joined.as_str()), ("range", "1d"), ("interval", "1d")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let quotes = parse_spark(&body)?;
        for symbol in symbols.iter().filter(|s| !quotes.contains_key(*s)) {
            warn!("No quote returned for {}", symbol);
        }

        Ok(quotes)
    }
}

/// Decode a spark response body. Entries lacking a price or prior close are dropped.
pub fn parse_spark(body: &str) -> Result<QuoteBatch> {
    let envelope: SparkEnvelope = serde_json::from_str(body)?;

    let results = match (envelope.spark.result, envelope.spark.error) {
        (Some(results), _) => results,
        (None, Some(error)) => return Err(StockWatchError::ProviderError(error.to_string())),
        (None, None) => Vec::new(),
    };

    let mut quotes = QuoteBatch::with_capacity(results.len());
    for result in results {
        let symbol = result.symbol.to_uppercase();
        match result.response.first().and_then(|r| r.meta.quote()) {
            Some(quote) => {
                quotes.insert(symbol, quote);
            }
            None => warn!("Incomplete quote data for {}; skipping", symbol),
        }
    }

    Ok(quotes)
}
