// src/error.rs
use std::fmt;
use thiserror::Error;
use warp::reject::Reject;

pub const CONNECTION_ERROR: &str = "Error connecting to server";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{service} responded with HTTP {status}")]
    Status { service: &'static str, status: u16 },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    /// Text shown in the dashboard. Only backend rejections carry their own
    /// wording; everything else is a connection problem to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected(message) => message.clone(),
            _ => CONNECTION_ERROR.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Rejection raised by dashboard routes for malformed form input.
#[derive(Debug)]
pub struct CustomError {
    pub message: String,
}

impl fmt::Display for CustomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CustomError {}

impl Reject for CustomError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_errors_keep_backend_wording() {
        let err = ApiError::Rejected("Invalid username or password".to_string());
        assert_eq!(err.user_message(), "Invalid username or password");
    }

    #[test]
    fn transport_errors_collapse_to_connection_message() {
        let err = ApiError::Status {
            service: "backend",
            status: 502,
        };
        assert_eq!(err.user_message(), CONNECTION_ERROR);
        assert_eq!(err.to_string(), "backend responded with HTTP 502");
    }
}
