// src/market.rs
use crate::error::ApiError;
use crate::models::{PricePoint, Quote, TickerInfo};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timespan {
    Day,
    Week,
}

impl Timespan {
    fn as_str(self) -> &'static str {
        match self {
            Timespan::Day => "day",
            Timespan::Week => "week",
        }
    }
}

/// Ticker lookups and price history from the market-data provider.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// `None` when the symbol is unknown or the provider could not be asked.
    async fn verify_symbol(&self, symbol: &str) -> Option<TickerInfo>;

    async fn historical(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        timespan: Timespan,
    ) -> Result<Vec<PricePoint>, ApiError>;

    async fn previous_close(&self, symbol: &str) -> Result<Option<Quote>, ApiError>;
}

#[derive(Deserialize)]
struct TickerResponse {
    results: Option<TickerResults>,
}

#[derive(Deserialize)]
struct TickerResults {
    name: Option<String>,
    market: Option<String>,
}

#[derive(Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateBar>,
}

#[derive(Deserialize)]
struct AggregateBar {
    #[serde(rename = "t")]
    timestamp: i64,
    #[serde(rename = "o", default)]
    open: f64,
    #[serde(rename = "h", default)]
    high: f64,
    #[serde(rename = "l", default)]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v", default)]
    volume: f64,
}

#[derive(Clone)]
pub struct PolygonClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl PolygonClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        PolygonClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                service: "market data",
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    async fn lookup_ticker(&self, symbol: &str) -> Result<TickerInfo, ApiError> {
        let response: TickerResponse = self
            .get(&format!("/v3/reference/tickers/{}", symbol))
            .await?
            .json()
            .await?;
        let results = response.results;
        Ok(TickerInfo {
            symbol: symbol.to_string(),
            name: results
                .as_ref()
                .and_then(|r| r.name.clone())
                .unwrap_or_else(|| symbol.to_string()),
            market: results
                .and_then(|r| r.market)
                .unwrap_or_else(|| "Unknown".to_string()),
        })
    }
}

#[async_trait]
impl MarketData for PolygonClient {
    async fn verify_symbol(&self, symbol: &str) -> Option<TickerInfo> {
        match self.lookup_ticker(symbol).await {
            Ok(info) => {
                info!("Verified ticker {} ({})", symbol, info.name);
                Some(info)
            }
            Err(e) => {
                error!("Stock verification error for {}: {}", symbol, e);
                None
            }
        }
    }

    async fn historical(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        timespan: Timespan,
    ) -> Result<Vec<PricePoint>, ApiError> {
        let path = format!(
            "/v2/aggs/ticker/{}/range/1/{}/{}/{}",
            symbol,
            timespan.as_str(),
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        let result = async {
            let response: AggregateResponse = self.get(&path).await?.json().await?;
            Ok::<_, ApiError>(
                response
                    .results
                    .into_iter()
                    .filter_map(|bar| {
                        DateTime::<Utc>::from_timestamp_millis(bar.timestamp).map(|timestamp| PricePoint {
                            timestamp,
                            close: bar.close,
                        })
                    })
                    .collect(),
            )
        }
        .await;
        if let Err(e) = &result {
            error!("Historical data error for {}: {}", symbol, e);
        }
        result
    }

    async fn previous_close(&self, symbol: &str) -> Result<Option<Quote>, ApiError> {
        let path = format!("/v2/aggs/ticker/{}/prev", symbol);
        let result = async {
            let response: AggregateResponse = self.get(&path).await?.json().await?;
            Ok::<_, ApiError>(response.results.into_iter().next().map(|bar| Quote {
                symbol: symbol.to_string(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }))
        }
        .await;
        if let Err(e) = &result {
            error!("Stock details error for {}: {}", symbol, e);
        }
        result
    }
}
