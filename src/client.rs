// src/client.rs
use crate::error::ApiError;
use crate::models::{AnalysisResult, AuthResponse, Frequency, SourceArticles, StatusResponse, User};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

/// The external service that owns users, portfolios and predictions.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn test_connection(&self) -> Result<String, ApiError>;
    async fn signup(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError>;
    async fn signin(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError>;
    async fn update_stocks(&self, username: &str, stocks: &[String]) -> Result<StatusResponse, ApiError>;
    async fn update_frequency(&self, username: &str, frequency: Frequency) -> Result<StatusResponse, ApiError>;
    async fn user_data(&self, username: &str) -> Result<User, ApiError>;
    async fn news(&self, stock: &str) -> Result<BTreeMap<String, SourceArticles>, ApiError>;
    async fn predict(&self, stock: &str) -> Result<AnalysisResult, ApiError>;
    async fn save_analysis(&self, username: &str, analysis: &AnalysisResult) -> Result<StatusResponse, ApiError>;
    async fn get_analysis(&self, username: &str, stock: &str) -> Result<Option<AnalysisResult>, ApiError>;
    async fn update_username(&self, username: &str, new_username: &str) -> Result<StatusResponse, ApiError>;
    async fn update_password(&self, username: &str, password: &str) -> Result<StatusResponse, ApiError>;
}

#[derive(Deserialize)]
struct TestResponse {
    message: String,
}

#[derive(Deserialize)]
struct AnalysisEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    analysis: Option<AnalysisResult>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    client: Client,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        BackendClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        debug!("POST {}", self.url(path));
        let response = self.client.post(self.url(path)).json(body).send().await?;
        decode(response).await
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        debug!("GET {}", self.url(path));
        let response = self.client.get(self.url(path)).query(query).send().await?;
        decode(response).await
    }
}

/// The backend answers rejections (bad credentials, taken usernames) with a
/// non-2xx status and a normal envelope, so the body wins over the status
/// whenever it parses.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    match serde_json::from_slice::<T>(&bytes) {
        Ok(value) => Ok(value),
        Err(e) if status.is_success() => Err(ApiError::Decode(e)),
        Err(_) => Err(ApiError::Status {
            service: "backend",
            status: status.as_u16(),
        }),
    }
}

fn logged<T>(context: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if let Err(e) = &result {
        error!("{} error: {}", context, e);
    }
    result
}

#[async_trait]
impl Backend for BackendClient {
    async fn test_connection(&self) -> Result<String, ApiError> {
        let result = self.get_json::<TestResponse>("test", &[]).await;
        logged("Connection test", result.map(|r| r.message))
    }

    async fn signup(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = Credentials { username, password };
        logged("Signup", self.post_json("signup", &body).await)
    }

    async fn signin(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = Credentials { username, password };
        logged("Signin", self.post_json("signin", &body).await)
    }

    async fn update_stocks(&self, username: &str, stocks: &[String]) -> Result<StatusResponse, ApiError> {
        let body = json!({ "username": username, "stocks": stocks });
        logged("Update stocks", self.post_json("update_stocks", &body).await)
    }

    async fn update_frequency(&self, username: &str, frequency: Frequency) -> Result<StatusResponse, ApiError> {
        let body = json!({ "username": username, "frequency": frequency });
        logged("Update frequency", self.post_json("update_frequency", &body).await)
    }

    async fn user_data(&self, username: &str) -> Result<User, ApiError> {
        logged(
            "Get user data",
            self.get_json("user_data", &[("username", username)]).await,
        )
    }

    async fn news(&self, stock: &str) -> Result<BTreeMap<String, SourceArticles>, ApiError> {
        let body = json!({ "stock": stock });
        logged("News", self.post_json("data", &body).await)
    }

    async fn predict(&self, stock: &str) -> Result<AnalysisResult, ApiError> {
        let body = json!({ "stock": stock });
        logged("Predict", self.post_json("predict", &body).await)
    }

    async fn save_analysis(&self, username: &str, analysis: &AnalysisResult) -> Result<StatusResponse, ApiError> {
        let body = json!({
            "username": username,
            "stock": analysis.stock,
            "analysis": analysis,
        });
        logged("Save analysis", self.post_json("saveAnalysis", &body).await)
    }

    async fn get_analysis(&self, username: &str, stock: &str) -> Result<Option<AnalysisResult>, ApiError> {
        let result = self
            .get_json::<AnalysisEnvelope>("getAnalysis", &[("username", username), ("stock", stock)])
            .await
            .map(|envelope| if envelope.success { envelope.analysis } else { None });
        logged("Get analysis", result)
    }

    async fn update_username(&self, username: &str, new_username: &str) -> Result<StatusResponse, ApiError> {
        let body = json!({ "username": username, "new_username": new_username });
        logged("Update username", self.post_json("update_username", &body).await)
    }

    async fn update_password(&self, username: &str, password: &str) -> Result<StatusResponse, ApiError> {
        let body = Credentials { username, password };
        logged("Update password", self.post_json("update_password", &body).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CONNECTION_ERROR;
    use crate::models::Sentiment;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use warp::Filter;

    macro_rules! serve {
        ($routes:expr) => {{
            let (addr, server) = warp::serve($routes).bind_ephemeral(([127, 0, 0, 1], 0));
            tokio::spawn(server);
            addr
        }};
    }

    fn client_for(addr: SocketAddr) -> BackendClient {
        BackendClient::new(&format!("http://{}/api/", addr))
    }

    #[tokio::test]
    async fn signin_posts_credentials() {
        let routes = warp::path!("api" / "signin")
            .and(warp::post())
            .and(warp::body::json())
            .map(|body: Value| {
                assert_eq!(body["username"], "alice");
                assert_eq!(body["password"], "secret1");
                warp::reply::json(&json!({
                    "success": true,
                    "user": {"username": "alice", "stocks": ["AAPL"], "frequency": "weekly"}
                }))
            });
        let client = client_for(serve!(routes));

        let response = client.signin("alice", "secret1").await.unwrap();
        assert!(response.success);
        let user = response.user.unwrap();
        assert_eq!(user.symbols(), vec!["AAPL"]);
        assert_eq!(user.frequency, Frequency::Weekly);
    }

    #[tokio::test]
    async fn rejected_signin_body_is_returned_despite_status() {
        let routes = warp::path!("api" / "signin").map(|| {
            warp::reply::with_status(
                warp::reply::json(&json!({"success": false, "message": "Invalid credentials"})),
                warp::http::StatusCode::UNAUTHORIZED,
            )
        });
        let client = client_for(serve!(routes));

        let response = client.signin("alice", "wrong-pass").await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Invalid credentials"));
    }

    #[tokio::test]
    async fn server_errors_without_envelope_map_to_status() {
        let routes = warp::path!("api" / "predict").map(|| {
            warp::reply::with_status("boom", warp::http::StatusCode::INTERNAL_SERVER_ERROR)
        });
        let client = client_for(serve!(routes));

        let err = client.predict("AAPL").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn get_analysis_reads_envelope() {
        let routes = warp::path!("api" / "getAnalysis")
            .and(warp::query::<HashMap<String, String>>())
            .map(|query: HashMap<String, String>| {
                if query.get("stock").map(String::as_str) == Some("NVDA") {
                    warp::reply::json(&json!({
                        "success": true,
                        "analysis": {"stock": "NVDA", "sentiment": "negative", "summary": "Chip export limits"}
                    }))
                } else {
                    warp::reply::json(&json!({"success": false}))
                }
            });
        let client = client_for(serve!(routes));

        let cached = client.get_analysis("alice", "NVDA").await.unwrap().unwrap();
        assert_eq!(cached.sentiment, Sentiment::Negative);
        assert!(client.get_analysis("alice", "AMZN").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_backend_reports_connection_error() {
        // Bind then drop a listener so the port is closed.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = BackendClient::new(&format!("http://127.0.0.1:{}/api", port));

        let err = client.test_connection().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(err.user_message(), CONNECTION_ERROR);
    }
}
