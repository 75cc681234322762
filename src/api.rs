// src/api.rs
use crate::analysis::{analyze, ChartRange};
use crate::auth::{
    validate_new_password, validate_new_username, validate_signin, validate_signup, CredentialsForm,
};
use crate::client::Backend;
use crate::error::CustomError;
use crate::market::MarketData;
use crate::models::User;
use crate::portfolio::{normalize_symbol, save_portfolio, Advance, PortfolioEditor, POPULAR_STOCKS};
use crate::refresher::BackendStatus;
use crate::session::{AuthMode, ResolvedSession, SessionStore, Tab, SESSION_COOKIE};
use crate::views;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::header::{HeaderValue, SET_COOKIE};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const FORM_LIMIT: u64 = 16 * 1024;

#[derive(Clone)]
pub struct AppContext {
    pub store: SessionStore,
    pub backend: Arc<dyn Backend>,
    pub market: Arc<dyn MarketData>,
    pub status: BackendStatus,
    pub secret: Arc<String>,
    pub session_ttl_hours: i64,
}

#[derive(Debug, Default, Deserialize)]
struct SymbolForm {
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Default, Deserialize)]
struct NextForm {
    #[serde(default)]
    frequency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RangeForm {
    #[serde(default)]
    range: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UsernameForm {
    #[serde(default)]
    new_username: String,
}

pub fn routes(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let session = warp::cookie::optional::<String>(SESSION_COOKIE).and(with_context(ctx));

    let index = warp::path::end()
        .and(warp::get())
        .and(session.clone())
        .and_then(index_handler);

    let health = warp::path!("health").and(warp::get()).map(|| "ok");

    let auth = warp::path!("auth")
        .and(warp::post())
        .and(session.clone())
        .and(form::<CredentialsForm>())
        .and_then(auth_handler);

    let auth_mode = warp::path!("auth" / "mode")
        .and(warp::post())
        .and(session.clone())
        .and_then(auth_mode_handler);

    let signout = warp::path!("signout")
        .and(warp::post())
        .and(session.clone())
        .and_then(signout_handler);

    let tab = warp::path!("tab" / String)
        .and(warp::post())
        .and(session.clone())
        .and_then(tab_handler);

    let edit = warp::path!("portfolio" / "edit")
        .and(warp::post())
        .and(session.clone())
        .and_then(edit_handler);

    let toggle = warp::path!("portfolio" / "toggle")
        .and(warp::post())
        .and(session.clone())
        .and(form::<SymbolForm>())
        .and_then(toggle_handler);

    let custom = warp::path!("portfolio" / "custom")
        .and(warp::post())
        .and(session.clone())
        .and(form::<SymbolForm>())
        .and_then(custom_handler);

    let next = warp::path!("portfolio" / "next")
        .and(warp::post())
        .and(session.clone())
        .and(form::<NextForm>())
        .and_then(next_handler);

    let back = warp::path!("portfolio" / "back")
        .and(warp::post())
        .and(session.clone())
        .and_then(back_handler);

    let clear = warp::path!("analysis" / "clear")
        .and(warp::post())
        .and(session.clone())
        .and_then(clear_handler);

    let analysis = warp::path!("analysis" / String)
        .and(warp::post())
        .and(session.clone())
        .and(form::<RangeForm>())
        .and_then(analyze_handler);

    let username = warp::path!("account" / "username")
        .and(warp::post())
        .and(session.clone())
        .and(form::<UsernameForm>())
        .and_then(username_handler);

    let password = warp::path!("account" / "password")
        .and(warp::post())
        .and(session)
        .and(form::<CredentialsForm>())
        .and_then(password_handler);

    index
        .or(health)
        .or(auth)
        .or(auth_mode)
        .or(signout)
        .or(tab)
        .or(edit)
        .or(toggle)
        .or(custom)
        .or(next)
        .or(back)
        .or(clear)
        .or(analysis)
        .or(username)
        .or(password)
        .recover(handle_rejection)
}

fn with_context(
    ctx: AppContext,
) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn form<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(FORM_LIMIT).and(warp::body::form())
}

fn bad_request(message: impl Into<String>) -> Rejection {
    warp::reject::custom(CustomError {
        message: message.into(),
    })
}

async fn open(cookie: Option<String>, ctx: &AppContext) -> ResolvedSession {
    ctx.store
        .resolve(cookie.as_deref(), &ctx.secret, ctx.session_ttl_hours)
        .await
}

/// Attaches the session cookie when the request started a new session.
fn finish(reply: impl Reply, session: &ResolvedSession, ctx: &AppContext) -> Response {
    let mut response = reply.into_response();
    if let Some(token) = &session.new_token {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            ctx.session_ttl_hours * 3600
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!("Invalid session cookie: {}", e),
        }
    }
    response
}

fn home(session: &ResolvedSession, ctx: &AppContext) -> Response {
    let reply = warp::reply::with_header(
        warp::reply::with_status(warp::reply(), StatusCode::SEE_OTHER),
        "location",
        "/",
    );
    finish(reply, session, ctx)
}

async fn index_handler(cookie: Option<String>, ctx: AppContext) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    let state = ctx
        .store
        .with(&session.id, |state| {
            let snapshot = state.clone();
            state.clear_flash();
            snapshot
        })
        .await;
    let status = ctx.status.read().await.clone();
    let html = views::render(&state, status.as_deref());
    Ok(finish(warp::reply::html(html), &session, &ctx))
}

/// Current user's record from the backend, or a bare user when that fails.
async fn load_user(backend: &dyn Backend, username: &str) -> User {
    match backend.user_data(username).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Could not load data for {}: {}", username, e);
            User::new(username)
        }
    }
}

async fn auth_handler(
    cookie: Option<String>,
    ctx: AppContext,
    form: CredentialsForm,
) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    let mode = ctx.store.with(&session.id, |state| state.auth_mode).await;

    let errors = match mode {
        AuthMode::SignUp => validate_signup(&form),
        AuthMode::SignIn => validate_signin(&form),
    };
    if !errors.is_empty() {
        ctx.store
            .with(&session.id, |state| {
                state.errors = errors;
                state.form_username = form.username.clone();
            })
            .await;
        return Ok(home(&session, &ctx));
    }

    let response = match mode {
        AuthMode::SignUp => ctx.backend.signup(&form.username, &form.password).await,
        AuthMode::SignIn => ctx.backend.signin(&form.username, &form.password).await,
    };
    let outcome = match response {
        Ok(reply) if reply.success => Ok(match reply.user {
            Some(user) => user,
            None => load_user(ctx.backend.as_ref(), &form.username).await,
        }),
        Ok(reply) => Err(reply.message.unwrap_or_else(|| match mode {
            AuthMode::SignUp => "Could not create account".to_string(),
            AuthMode::SignIn => "Invalid username or password".to_string(),
        })),
        Err(e) => Err(e.user_message()),
    };

    ctx.store
        .with(&session.id, |state| match outcome {
            Ok(user) => {
                state.sign_in(user);
                state.account_created = mode == AuthMode::SignUp;
            }
            Err(message) => {
                info!("Authentication failed for {}: {}", form.username, message);
                state.errors.clear();
                state.errors.insert("form", message);
                state.form_username = form.username.clone();
            }
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn auth_mode_handler(cookie: Option<String>, ctx: AppContext) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    ctx.store
        .with(&session.id, |state| {
            state.auth_mode = state.auth_mode.toggled();
            state.errors.clear();
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn signout_handler(cookie: Option<String>, ctx: AppContext) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    ctx.store.with(&session.id, |state| state.sign_out()).await;
    Ok(home(&session, &ctx))
}

async fn tab_handler(name: String, cookie: Option<String>, ctx: AppContext) -> Result<Response, Rejection> {
    let tab: Tab = name.parse().map_err(bad_request)?;
    let session = open(cookie, &ctx).await;
    ctx.store
        .with(&session.id, |state| {
            if state.is_authenticated() {
                state.tab = tab;
            }
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn edit_handler(cookie: Option<String>, ctx: AppContext) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    ctx.store
        .with(&session.id, |state| {
            if let Some(user) = &state.user {
                state.editor = Some(PortfolioEditor::new(user.stocks.clone(), user.frequency));
                state.tab = Tab::Portfolio;
            }
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn toggle_handler(
    cookie: Option<String>,
    ctx: AppContext,
    form: SymbolForm,
) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    let symbol = normalize_symbol(&form.symbol).ok_or_else(|| bad_request("Missing stock symbol"))?;
    ctx.store
        .with(&session.id, |state| {
            if let Some(editor) = state.editor.as_mut() {
                // Only popular symbols can be added this way; custom ones go
                // through verification.
                if editor.contains(&symbol) || POPULAR_STOCKS.contains(&symbol.as_str()) {
                    editor.toggle(&symbol);
                }
            }
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn custom_handler(
    cookie: Option<String>,
    ctx: AppContext,
    form: SymbolForm,
) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    let editor = ctx.store.with(&session.id, |state| state.editor.clone()).await;
    if let Some(mut editor) = editor {
        editor.add_custom(&form.symbol, ctx.market.as_ref()).await;
        ctx.store
            .with(&session.id, |state| {
                if state.editor.is_some() {
                    state.editor = Some(editor);
                }
            })
            .await;
    }
    Ok(home(&session, &ctx))
}

async fn next_handler(
    cookie: Option<String>,
    ctx: AppContext,
    form: NextForm,
) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    let (username, editor) = ctx
        .store
        .with(&session.id, |state| {
            (state.username().map(str::to_string), state.editor.clone())
        })
        .await;
    let (username, mut editor) = match (username, editor) {
        (Some(username), Some(editor)) => (username, editor),
        _ => return Ok(home(&session, &ctx)),
    };

    if let Some(raw) = form.frequency {
        editor.frequency = raw.parse().map_err(bad_request)?;
    }

    if editor.next_step() == Some(Advance::Submit) {
        match save_portfolio(ctx.backend.as_ref(), &username, &editor).await {
            Ok(()) => {
                ctx.store
                    .with(&session.id, |state| {
                        if let Some(user) = state.user.as_mut() {
                            user.stocks = editor.stocks.clone();
                            user.frequency = editor.frequency;
                        }
                        state.editor = None;
                        state.notice = Some("Portfolio saved".to_string());
                    })
                    .await;
                return Ok(home(&session, &ctx));
            }
            Err(e) => {
                editor.errors.insert("form", e.user_message());
            }
        }
    }

    ctx.store
        .with(&session.id, |state| {
            if state.editor.is_some() {
                state.editor = Some(editor);
            }
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn back_handler(cookie: Option<String>, ctx: AppContext) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    ctx.store
        .with(&session.id, |state| {
            if let Some(editor) = state.editor.as_mut() {
                editor.prev_step();
            }
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn clear_handler(cookie: Option<String>, ctx: AppContext) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    ctx.store
        .with(&session.id, |state| {
            state.selected = None;
            state.view = None;
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn analyze_handler(
    symbol: String,
    cookie: Option<String>,
    ctx: AppContext,
    form: RangeForm,
) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    let symbol = normalize_symbol(&symbol).ok_or_else(|| bad_request("Missing stock symbol"))?;
    let range = match form.range {
        Some(raw) => raw.parse::<ChartRange>().map_err(bad_request)?,
        None => ChartRange::default(),
    };

    let (user, cached) = ctx
        .store
        .with(&session.id, |state| {
            (state.user.clone(), state.analyses.get(&symbol).cloned())
        })
        .await;
    let user = match user {
        Some(user) => user,
        None => return Ok(home(&session, &ctx)),
    };
    if !user.stocks.iter().any(|s| s.symbol == symbol) {
        return Err(bad_request(format!("{} is not in your portfolio", symbol)));
    }

    ctx.store
        .with(&session.id, |state| {
            state.selected = Some(symbol.clone());
            state.range = range;
            state.tab = Tab::Analysis;
        })
        .await;

    debug!("Analyzing {} for {}", symbol, user.username);
    let view = analyze(
        ctx.backend.as_ref(),
        ctx.market.as_ref(),
        Some(&user),
        &symbol,
        cached,
        range,
        Utc::now(),
    )
    .await;

    ctx.store
        .with(&session.id, |state| {
            if state.username() != Some(user.username.as_str()) {
                return;
            }
            if !view.degraded {
                state.analyses.insert(symbol.clone(), view.result.clone());
            }
            // A later click may have picked another symbol meanwhile.
            if state.selected.as_deref() == Some(symbol.as_str()) {
                state.view = Some(view);
            }
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn username_handler(
    cookie: Option<String>,
    ctx: AppContext,
    form: UsernameForm,
) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    let current = ctx
        .store
        .with(&session.id, |state| state.username().map(str::to_string))
        .await;
    let current = match current {
        Some(name) => name,
        None => return Ok(home(&session, &ctx)),
    };

    let errors = validate_new_username(&form.new_username);
    let result = if errors.is_empty() {
        match ctx.backend.update_username(&current, &form.new_username).await {
            Ok(reply) if reply.success => Ok(()),
            Ok(reply) => Err(reply
                .message
                .unwrap_or_else(|| "Could not update username".to_string())),
            Err(e) => Err(e.user_message()),
        }
    } else {
        Err(errors.values().cloned().collect::<Vec<_>>().join(" "))
    };

    ctx.store
        .with(&session.id, |state| {
            state.tab = Tab::Account;
            match result {
                Ok(()) => {
                    if let Some(user) = state.user.as_mut() {
                        info!("{} renamed to {}", user.username, form.new_username);
                        user.username = form.new_username.clone();
                    }
                    state.notice = Some("Username updated".to_string());
                }
                Err(message) => {
                    state.errors.insert("username", message);
                }
            }
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn password_handler(
    cookie: Option<String>,
    ctx: AppContext,
    form: CredentialsForm,
) -> Result<Response, Rejection> {
    let session = open(cookie, &ctx).await;
    let current = ctx
        .store
        .with(&session.id, |state| state.username().map(str::to_string))
        .await;
    let current = match current {
        Some(name) => name,
        None => return Ok(home(&session, &ctx)),
    };

    let errors = validate_new_password(&form.password, &form.confirm_password);
    if !errors.is_empty() {
        ctx.store
            .with(&session.id, |state| {
                state.tab = Tab::Account;
                state.errors = errors;
            })
            .await;
        return Ok(home(&session, &ctx));
    }

    let result = match ctx.backend.update_password(&current, &form.password).await {
        Ok(reply) if reply.success => Ok(()),
        Ok(reply) => Err(reply
            .message
            .unwrap_or_else(|| "Could not update password".to_string())),
        Err(e) => Err(e.user_message()),
    };
    ctx.store
        .with(&session.id, |state| {
            state.tab = Tab::Account;
            match result {
                Ok(()) => state.notice = Some("Password updated".to_string()),
                Err(message) => {
                    state.errors.insert("password", message);
                }
            }
        })
        .await;
    Ok(home(&session, &ctx))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Page not found".to_string())
    } else if let Some(e) = err.find::<CustomError>() {
        (StatusCode::BAD_REQUEST, e.message.clone())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        warn!("Rejected request: {:?}", err);
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };
    Ok(warp::reply::with_status(
        warp::reply::html(views::error_page(status.as_u16(), &message)),
        status,
    ))
}
