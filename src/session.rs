// src/session.rs
use crate::analysis::{AnalysisView, ChartRange};
use crate::auth::{create_token, verify_token, FieldErrors};
use crate::models::{AnalysisResult, Frequency, PortfolioEntry, User};
use crate::portfolio::PortfolioEditor;
use chrono::{DateTime, Duration, Utc};
use log::{error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const SESSION_COOKIE: &str = "stocker_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

impl AuthMode {
    pub fn toggled(self) -> Self {
        match self {
            AuthMode::SignIn => AuthMode::SignUp,
            AuthMode::SignUp => AuthMode::SignIn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Portfolio,
    Analysis,
    Account,
}

impl std::str::FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "portfolio" => Ok(Tab::Portfolio),
            "analysis" => Ok(Tab::Analysis),
            "account" => Ok(Tab::Account),
            other => Err(format!("unknown tab {:?}", other)),
        }
    }
}

/// Everything one browser sees. Discarded on sign-out.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub auth_mode: AuthMode,
    pub user: Option<User>,
    pub account_created: bool,
    pub tab: Tab,
    pub editor: Option<PortfolioEditor>,
    pub selected: Option<String>,
    pub range: ChartRange,
    pub view: Option<AnalysisView>,
    pub analyses: HashMap<String, AnalysisResult>,
    pub errors: FieldErrors,
    pub notice: Option<String>,
    pub form_username: String,
}

impl DashboardState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    pub fn portfolio(&self) -> &[PortfolioEntry] {
        self.user.as_ref().map(|u| u.stocks.as_slice()).unwrap_or(&[])
    }

    pub fn frequency(&self) -> Frequency {
        self.user.as_ref().map(|u| u.frequency).unwrap_or_default()
    }

    pub fn sign_in(&mut self, user: User) {
        info!("{} signed in", user.username);
        self.form_username = user.username.clone();
        self.editor = if user.stocks.is_empty() {
            Some(PortfolioEditor::new(Vec::new(), user.frequency))
        } else {
            None
        };
        self.user = Some(user);
        self.tab = Tab::Portfolio;
        self.errors.clear();
    }

    pub fn sign_out(&mut self) {
        if let Some(name) = self.username() {
            info!("{} signed out", name);
        }
        *self = DashboardState::default();
    }

    /// Drops one-shot messages once they have been rendered.
    pub fn clear_flash(&mut self) {
        self.notice = None;
        self.account_created = false;
        self.errors.clear();
        if let Some(editor) = self.editor.as_mut() {
            editor.errors.clear();
        }
    }
}

struct SessionEntry {
    state: DashboardState,
    /// Matches the `exp` of the cookie handed out with the session.
    expires_at: DateTime<Utc>,
}

impl SessionEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

pub struct ResolvedSession {
    pub id: String,
    /// Cookie value to hand back when a new session was started.
    pub new_token: Option<String>,
}

impl SessionStore {
    /// Maps a cookie to a live session, starting a new one when the cookie is
    /// missing, forged, expired or refers to a session this process forgot.
    pub async fn resolve(&self, token: Option<&str>, secret: &str, ttl_hours: i64) -> ResolvedSession {
        let now = Utc::now();
        if let Some(id) = token.and_then(|t| verify_token(t, secret)) {
            let live = self
                .inner
                .read()
                .await
                .get(&id)
                .map_or(false, |entry| entry.is_live(now));
            if live {
                return ResolvedSession { id, new_token: None };
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.inner.write().await.insert(
            id.clone(),
            SessionEntry {
                state: DashboardState::default(),
                expires_at: now + Duration::hours(ttl_hours),
            },
        );
        let new_token = match create_token(&id, secret, ttl_hours) {
            Ok(token) => Some(token),
            Err(e) => {
                error!("Failed to sign session token: {}", e);
                None
            }
        };
        ResolvedSession { id, new_token }
    }

    /// Runs `f` against the session's state. A session that has already been
    /// purged gets a scratch state that is thrown away afterwards.
    pub async fn with<F, R>(&self, id: &str, f: F) -> R
    where
        F: FnOnce(&mut DashboardState) -> R,
    {
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(id) {
            Some(entry) => f(&mut entry.state),
            None => f(&mut DashboardState::default()),
        }
    }

    pub async fn snapshot(&self, id: &str) -> DashboardState {
        self.inner
            .read()
            .await
            .get(id)
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    /// Live signed-in sessions as (session id, user, cached analyses).
    pub async fn signed_in(&self, now: DateTime<Utc>) -> Vec<(String, User, HashMap<String, AnalysisResult>)> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .filter_map(|(id, entry)| {
                entry
                    .state
                    .user
                    .as_ref()
                    .map(|user| (id.clone(), user.clone(), entry.state.analyses.clone()))
            })
            .collect()
    }

    /// Drops sessions whose cookie has expired. Returns how many went.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.is_live(now));
        before - sessions.len()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
