// src/auth.rs
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_USERNAME_LEN: usize = 4;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Field name to message, in display order.
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Signs the browser session id into the cookie value.
pub fn create_token(
    session_id: &str,
    secret: &str,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: session_id.to_string(),
        exp: (Utc::now() + Duration::hours(ttl_hours)).timestamp().max(0) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

/// Session id carried by a valid, unexpired token.
pub fn verify_token(token: &str, secret: &str) -> Option<String> {
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    ) {
        Ok(data) => Some(data.claims.sub),
        Err(e) => {
            debug!("Discarding session token: {}", e);
            None
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

fn check_username(username: &str, errors: &mut FieldErrors) {
    if username.is_empty() {
        errors.insert("username", "Username is required".to_string());
    } else if username.chars().count() < MIN_USERNAME_LEN {
        errors.insert(
            "username",
            format!("Username must be at least {} characters", MIN_USERNAME_LEN),
        );
    }
}

fn check_password(password: &str, confirm: &str, errors: &mut FieldErrors) {
    if password.is_empty() {
        errors.insert("password", "Password is required".to_string());
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.insert(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }
    if password != confirm {
        errors.insert("confirm_password", "Passwords do not match".to_string());
    }
}

pub fn validate_signup(form: &CredentialsForm) -> FieldErrors {
    let mut errors = FieldErrors::new();
    check_username(&form.username, &mut errors);
    check_password(&form.password, &form.confirm_password, &mut errors);
    errors
}

pub fn validate_signin(form: &CredentialsForm) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if form.username.is_empty() {
        errors.insert("username", "Username is required".to_string());
    }
    if form.password.is_empty() {
        errors.insert("password", "Password is required".to_string());
    }
    errors
}

pub fn validate_new_username(username: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    check_username(username, &mut errors);
    errors
}

pub fn validate_new_password(password: &str, confirm: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    check_password(password, confirm, &mut errors);
    errors
}
