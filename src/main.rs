// src/main.rs
mod analysis;
mod api;
mod auth;
mod chart;
mod client;
mod config;
mod error;
mod market;
mod models;
mod portfolio;
mod refresher;
mod session;
#[cfg(test)]
mod testing;
mod views;

use crate::api::AppContext;
use crate::client::{Backend, BackendClient};
use crate::config::Config;
use crate::market::{MarketData, PolygonClient};
use crate::refresher::BackendStatus;
use crate::session::SessionStore;
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    info!("Starting the stock dashboard...");
    let backend: Arc<dyn Backend> = Arc::new(BackendClient::new(&config.backend_url));
    let market: Arc<dyn MarketData> =
        Arc::new(PolygonClient::new(&config.market_url, &config.market_api_key));

    let status: BackendStatus = Arc::default();
    match backend.test_connection().await {
        Ok(message) => {
            info!("Connected to backend at {}: {}", config.backend_url, message);
            *status.write().await = Some(message);
        }
        Err(e) => warn!("Backend at {} is not reachable yet: {}", config.backend_url, e),
    }

    let store = SessionStore::default();
    let (tx, rx) = mpsc::channel(100);
    task::spawn(refresher::worker(store.clone(), backend.clone(), rx));
    task::spawn(refresher::schedule(
        store.clone(),
        backend.clone(),
        status.clone(),
        tx,
        config.refresh_interval,
    ));

    let routes = api::routes(AppContext {
        store,
        backend,
        market,
        status,
        secret: Arc::new(config.session_secret.clone()),
        session_ttl_hours: config.session_ttl_hours,
    });

    info!("Dashboard running on http://{}", config.bind_addr);
    warp::serve(routes).run(config.bind_addr).await;
}
