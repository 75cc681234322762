// src/refresher.rs
use crate::analysis::predict_and_save;
use crate::client::Backend;
use crate::models::{AnalysisResult, User};
use crate::session::SessionStore;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{self, MissedTickBehavior};

/// Last message from the backend's connection test, or the error text.
pub type BackendStatus = Arc<RwLock<Option<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshJob {
    pub session_id: String,
    pub username: String,
    pub symbol: String,
}

/// Portfolio symbols with no cached analysis or one older than the user's
/// frequency allows.
pub fn stale_symbols(
    user: &User,
    analyses: &HashMap<String, AnalysisResult>,
    now: DateTime<Utc>,
) -> Vec<String> {
    user.stocks
        .iter()
        .filter(|entry| match analyses.get(&entry.symbol) {
            Some(result) => result.is_stale(user.frequency, now),
            None => true,
        })
        .map(|entry| entry.symbol.clone())
        .collect()
}

pub async fn scan(store: &SessionStore, now: DateTime<Utc>) -> Vec<RefreshJob> {
    store
        .signed_in(now)
        .await
        .into_iter()
        .flat_map(|(session_id, user, analyses)| {
            stale_symbols(&user, &analyses, now)
                .into_iter()
                .map(move |symbol| RefreshJob {
                    session_id: session_id.clone(),
                    username: user.username.clone(),
                    symbol,
                })
        })
        .collect()
}

async fn update_status(backend: &dyn Backend, status: &BackendStatus) {
    let message = match backend.test_connection().await {
        Ok(message) => message,
        Err(e) => e.user_message(),
    };
    *status.write().await = Some(message);
}

/// Ticks every `interval`, queueing stale analyses for the worker.
pub async fn schedule(
    store: SessionStore,
    backend: Arc<dyn Backend>,
    status: BackendStatus,
    tx: mpsc::Sender<RefreshJob>,
    interval: Duration,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        update_status(backend.as_ref(), &status).await;

        let now = Utc::now();
        let purged = store.purge_expired(now).await;
        if purged > 0 {
            debug!("Dropped {} expired sessions", purged);
        }

        let jobs = scan(&store, now).await;
        if !jobs.is_empty() {
            info!("Queueing {} stale analyses", jobs.len());
        }
        for job in jobs {
            if tx.send(job).await.is_err() {
                error!("Refresh worker stopped; ending scheduler");
                return;
            }
        }
    }
}

/// Refreshes one job unless the session moved on or another request already
/// refreshed the symbol.
pub async fn refresh(store: &SessionStore, backend: &dyn Backend, job: RefreshJob) {
    let state = store.snapshot(&job.session_id).await;
    let still_wanted = match &state.user {
        Some(user) if user.username == job.username => {
            stale_symbols(user, &state.analyses, Utc::now()).contains(&job.symbol)
        }
        _ => false,
    };
    if !still_wanted {
        debug!("Skipping refresh of {} for {}", job.symbol, job.username);
        return;
    }

    let (result, degraded) = predict_and_save(backend, Some(&job.username), &job.symbol).await;
    if degraded {
        error!("Refresh of {} for {} failed; will retry next tick", job.symbol, job.username);
        return;
    }

    store
        .with(&job.session_id, |state| {
            if state.username() == Some(job.username.as_str()) {
                state.analyses.insert(job.symbol.clone(), result);
            }
        })
        .await;
    info!("Refreshed analysis of {} for {}", job.symbol, job.username);
}

pub async fn worker(store: SessionStore, backend: Arc<dyn Backend>, mut rx: mpsc::Receiver<RefreshJob>) {
    while let Some(job) = rx.recv().await {
        refresh(&store, backend.as_ref(), job).await;
    }
}
