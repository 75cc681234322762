// src/testing.rs
//! In-memory stand-ins for the backend and market-data services.

use crate::client::Backend;
use crate::error::ApiError;
use crate::market::{MarketData, Timespan};
use crate::models::{
    AnalysisResult, AuthResponse, Frequency, PortfolioEntry, PricePoint, Quote, Sentiment,
    SourceArticles, StatusResponse, TickerInfo, User,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
struct BackendState {
    users: HashMap<String, (String, User)>,
    saved: HashMap<(String, String), AnalysisResult>,
    calls: Vec<String>,
    reject_updates: Option<String>,
    offline: bool,
    predictions_down: bool,
    predictions_without_news: bool,
    held: HashMap<String, Arc<Notify>>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

fn unavailable() -> ApiError {
    ApiError::Status {
        service: "backend",
        status: 503,
    }
}

fn ok() -> StatusResponse {
    StatusResponse {
        success: true,
        message: None,
    }
}

impl FakeBackend {
    pub fn with_user(username: &str, password: &str, stocks: &[&str], frequency: Frequency) -> Self {
        let backend = FakeBackend::default();
        let user = User {
            username: username.to_string(),
            stocks: stocks.iter().map(|s| PortfolioEntry::new(*s)).collect(),
            frequency,
        };
        backend
            .state
            .lock()
            .unwrap()
            .users
            .insert(username.to_string(), (password.to_string(), user));
        backend
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reject_updates(&self, message: &str) {
        self.state.lock().unwrap().reject_updates = Some(message.to_string());
    }

    pub fn go_offline(&self) {
        self.state.lock().unwrap().offline = true;
    }

    pub fn fail_predictions(&self) {
        self.state.lock().unwrap().predictions_down = true;
    }

    pub fn strip_prediction_news(&self) {
        self.state.lock().unwrap().predictions_without_news = true;
    }

    /// Makes `predict` for `symbol` wait until the returned handle is notified.
    pub fn hold_prediction(&self, symbol: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state
            .lock()
            .unwrap()
            .held
            .insert(symbol.to_string(), gate.clone());
        gate
    }

    pub fn store_analysis(&self, username: &str, analysis: AnalysisResult) {
        self.state
            .lock()
            .unwrap()
            .saved
            .insert((username.to_string(), analysis.stock.clone()), analysis);
    }

    fn record(&self, call: String) -> Result<std::sync::MutexGuard<'_, BackendState>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.offline {
            return Err(unavailable());
        }
        Ok(state)
    }

    fn update_result(state: &BackendState) -> StatusResponse {
        match &state.reject_updates {
            Some(message) => StatusResponse {
                success: false,
                message: Some(message.clone()),
            },
            None => ok(),
        }
    }
}

pub fn sample_analysis(symbol: &str) -> AnalysisResult {
    let mut news = BTreeMap::new();
    news.insert(
        "https://www.cnn.com/business/investing".to_string(),
        SourceArticles::Articles(vec![crate::models::NewsArticle {
            title: format!("{} rallies on earnings", symbol),
            url: "https://www.cnn.com/a".to_string(),
            first_paragraph: "Shares rose after the report.".to_string(),
            sentiment: Some(Sentiment::Positive),
        }]),
    );
    AnalysisResult {
        stock: symbol.to_string(),
        sentiment: Sentiment::Positive,
        prediction: "Upward trend expected".to_string(),
        summary: format!("Coverage of {} is upbeat.", symbol),
        external_factors: vec!["Quarterly earnings report".to_string()],
        news,
        last_updated: Utc::now(),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn test_connection(&self) -> Result<String, ApiError> {
        self.record("test".to_string())?;
        Ok("Flask backend is working!".to_string())
    }

    async fn signup(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let mut state = self.record(format!("signup {}", username))?;
        if state.users.contains_key(username) {
            return Ok(AuthResponse {
                success: false,
                message: Some("Username already exists".to_string()),
                user: None,
            });
        }
        let user = User::new(username);
        state
            .users
            .insert(username.to_string(), (password.to_string(), user.clone()));
        Ok(AuthResponse {
            success: true,
            message: None,
            user: Some(user),
        })
    }

    async fn signin(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let state = self.record(format!("signin {}", username))?;
        match state.users.get(username) {
            Some((stored, user)) if stored == password => Ok(AuthResponse {
                success: true,
                message: None,
                user: Some(user.clone()),
            }),
            _ => Ok(AuthResponse {
                success: false,
                message: Some("Invalid username or password".to_string()),
                user: None,
            }),
        }
    }

    async fn update_stocks(&self, username: &str, stocks: &[String]) -> Result<StatusResponse, ApiError> {
        let mut state = self.record(format!("update_stocks {} {}", username, stocks.join(",")))?;
        let result = Self::update_result(&state);
        if let Some((_, user)) = state.users.get_mut(username) {
            user.stocks = stocks.iter().map(PortfolioEntry::new).collect();
        }
        Ok(result)
    }

    async fn update_frequency(&self, username: &str, frequency: Frequency) -> Result<StatusResponse, ApiError> {
        let mut state = self.record(format!("update_frequency {} {}", username, frequency))?;
        let result = Self::update_result(&state);
        if let Some((_, user)) = state.users.get_mut(username) {
            user.frequency = frequency;
        }
        Ok(result)
    }

    async fn user_data(&self, username: &str) -> Result<User, ApiError> {
        let state = self.record(format!("user_data {}", username))?;
        state
            .users
            .get(username)
            .map(|(_, user)| user.clone())
            .ok_or_else(|| ApiError::Rejected("User not found".to_string()))
    }

    async fn news(&self, stock: &str) -> Result<BTreeMap<String, SourceArticles>, ApiError> {
        drop(self.record(format!("news {}", stock))?);
        Ok(sample_analysis(stock).news)
    }

    async fn predict(&self, stock: &str) -> Result<AnalysisResult, ApiError> {
        let (gate, without_news) = {
            let state = self.record(format!("predict {}", stock))?;
            if state.predictions_down {
                return Err(unavailable());
            }
            (state.held.get(stock).cloned(), state.predictions_without_news)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut result = sample_analysis(stock);
        if without_news {
            result.news.clear();
        }
        Ok(result)
    }

    async fn save_analysis(&self, username: &str, analysis: &AnalysisResult) -> Result<StatusResponse, ApiError> {
        let mut state = self.record(format!("save_analysis {} {}", username, analysis.stock))?;
        state
            .saved
            .insert((username.to_string(), analysis.stock.clone()), analysis.clone());
        Ok(ok())
    }

    async fn get_analysis(&self, username: &str, stock: &str) -> Result<Option<AnalysisResult>, ApiError> {
        let state = self.record(format!("get_analysis {} {}", username, stock))?;
        Ok(state
            .saved
            .get(&(username.to_string(), stock.to_string()))
            .cloned())
    }

    async fn update_username(&self, username: &str, new_username: &str) -> Result<StatusResponse, ApiError> {
        let mut state = self.record(format!("update_username {} {}", username, new_username))?;
        if state.users.contains_key(new_username) {
            return Ok(StatusResponse {
                success: false,
                message: Some("Username already exists".to_string()),
            });
        }
        if let Some((password, mut user)) = state.users.remove(username) {
            user.username = new_username.to_string();
            state.users.insert(new_username.to_string(), (password, user));
        }
        Ok(ok())
    }

    async fn update_password(&self, username: &str, password: &str) -> Result<StatusResponse, ApiError> {
        let mut state = self.record(format!("update_password {}", username))?;
        if let Some((stored, _)) = state.users.get_mut(username) {
            *stored = password.to_string();
        }
        Ok(ok())
    }
}

pub struct FakeMarket {
    symbols: Vec<String>,
    pub history_down: bool,
}

impl FakeMarket {
    pub fn with_symbols(symbols: &[&str]) -> Self {
        FakeMarket {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            history_down: false,
        }
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn verify_symbol(&self, symbol: &str) -> Option<TickerInfo> {
        self.symbols.iter().find(|s| *s == symbol).map(|s| TickerInfo {
            symbol: s.clone(),
            name: format!("{} Corp", s),
            market: "stocks".to_string(),
        })
    }

    async fn historical(
        &self,
        _symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        _timespan: Timespan,
    ) -> Result<Vec<PricePoint>, ApiError> {
        if self.history_down {
            return Err(ApiError::Status {
                service: "market data",
                status: 500,
            });
        }
        let start = Utc.from_utc_datetime(&from.and_hms_opt(0, 0, 0).unwrap_or_default());
        let days = (to - from).num_days().max(0);
        Ok((0..=days)
            .map(|i| PricePoint {
                timestamp: start + Duration::days(i),
                close: 100.0 + i as f64,
            })
            .collect())
    }

    async fn previous_close(&self, symbol: &str) -> Result<Option<Quote>, ApiError> {
        Ok(Some(Quote {
            symbol: symbol.to_string(),
            open: 99.0,
            high: 102.0,
            low: 98.0,
            close: 101.5,
            volume: 1_000_000.0,
        }))
    }
}
