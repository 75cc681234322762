// src/analysis.rs
use crate::client::Backend;
use crate::market::{MarketData, Timespan};
use crate::models::{AnalysisResult, PricePoint, Quote, User};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartRange {
    #[default]
    Month,
    Quarter,
    HalfYear,
    Year,
}

impl ChartRange {
    pub const ALL: [ChartRange; 4] = [
        ChartRange::Month,
        ChartRange::Quarter,
        ChartRange::HalfYear,
        ChartRange::Year,
    ];

    pub fn days(self) -> i64 {
        match self {
            ChartRange::Month => 30,
            ChartRange::Quarter => 90,
            ChartRange::HalfYear => 180,
            ChartRange::Year => 365,
        }
    }

    // A year of daily bars is more than the chart can show usefully.
    pub fn timespan(self) -> Timespan {
        match self {
            ChartRange::Year => Timespan::Week,
            _ => Timespan::Day,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChartRange::Month => "1m",
            ChartRange::Quarter => "3m",
            ChartRange::HalfYear => "6m",
            ChartRange::Year => "1y",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChartRange::Month => "1M",
            ChartRange::Quarter => "3M",
            ChartRange::HalfYear => "6M",
            ChartRange::Year => "1Y",
        }
    }
}

impl FromStr for ChartRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartRange::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown chart range {:?}", s))
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisView {
    pub symbol: String,
    pub range: ChartRange,
    pub history: Vec<PricePoint>,
    pub quote: Option<Quote>,
    pub result: AnalysisResult,
    /// The prediction service failed and `result` is the placeholder.
    pub degraded: bool,
}

/// A cached analysis still young enough for the user's frequency, checking
/// the session cache first and then the backend's copy.
async fn fresh_analysis(
    backend: &dyn Backend,
    user: Option<&User>,
    symbol: &str,
    local: Option<AnalysisResult>,
    now: DateTime<Utc>,
) -> Option<AnalysisResult> {
    let frequency = user.map(|u| u.frequency).unwrap_or_default();
    if let Some(result) = local.filter(|r| !r.is_stale(frequency, now)) {
        return Some(result);
    }
    let user = user?;
    match backend.get_analysis(&user.username, symbol).await {
        Ok(Some(result)) if !result.is_stale(frequency, now) => Some(result),
        Ok(_) => None,
        Err(e) => {
            warn!("Could not read cached analysis for {}: {}", symbol, e);
            None
        }
    }
}

/// Fetches a fresh prediction and, for a signed-in user, stores it with the
/// backend. Predictions without grouped articles pick them up from `/data`. The flag is true when the fallback payload was substituted.
pub async fn predict_and_save(
    backend: &dyn Backend,
    username: Option<&str>,
    symbol: &str,
) -> (AnalysisResult, bool) {
    match backend.predict(symbol).await {
        Ok(mut result) => {
            if result.news.is_empty() {
                match backend.news(symbol).await {
                    Ok(news) => result.news = news,
                    Err(e) => warn!("Could not load news for {}: {}", symbol, e),
                }
            }
            if let Some(username) = username {
                if let Err(e) = backend.save_analysis(username, &result).await {
                    warn!("Could not save analysis for {}: {}", symbol, e);
                }
            }
            info!("Fetched analysis for {}: {}", symbol, result.sentiment.as_str());
            (result, false)
        }
        Err(e) => {
            warn!("Using fallback analysis for {}: {}", symbol, e);
            (AnalysisResult::fallback(symbol), true)
        }
    }
}

pub async fn analyze(
    backend: &dyn Backend,
    market: &dyn MarketData,
    user: Option<&User>,
    symbol: &str,
    cached: Option<AnalysisResult>,
    range: ChartRange,
    now: DateTime<Utc>,
) -> AnalysisView {
    let to = now.date_naive();
    let from = to - Duration::days(range.days());

    let prediction = async {
        match fresh_analysis(backend, user, symbol, cached, now).await {
            Some(result) => (result, false),
            None => predict_and_save(backend, user.map(|u| u.username.as_str()), symbol).await,
        }
    };
    let (history, quote, (result, degraded)) = tokio::join!(
        market.historical(symbol, from, to, range.timespan()),
        market.previous_close(symbol),
        prediction,
    );

    AnalysisView {
        symbol: symbol.to_string(),
        range,
        history: history.unwrap_or_default(),
        quote: quote.ok().flatten(),
        result,
        degraded,
    }
}
