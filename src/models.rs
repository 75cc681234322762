// src/models.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EntryRepr")]
pub struct PortfolioEntry {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// The backend stores either bare symbols or symbol/name pairs.
#[derive(Deserialize)]
#[serde(untagged)]
enum EntryRepr {
    Symbol(String),
    Detailed {
        symbol: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl From<EntryRepr> for PortfolioEntry {
    fn from(repr: EntryRepr) -> Self {
        match repr {
            EntryRepr::Symbol(symbol) => PortfolioEntry { symbol, name: None },
            EntryRepr::Detailed { symbol, name } => PortfolioEntry { symbol, name },
        }
    }
}

impl PortfolioEntry {
    pub fn new(symbol: impl Into<String>) -> Self {
        PortfolioEntry {
            symbol: symbol.into(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
}

impl Frequency {
    pub const ALL: [Frequency; 4] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::BiWeekly,
        Frequency::Monthly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::BiWeekly => "bi-weekly",
            Frequency::Monthly => "monthly",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::BiWeekly => "Bi-weekly",
            Frequency::Monthly => "Monthly",
        }
    }

    /// How old a cached analysis may get before it is refreshed.
    pub fn max_age(self) -> Duration {
        match self {
            Frequency::Daily => Duration::days(1),
            Frequency::Weekly => Duration::days(7),
            Frequency::BiWeekly => Duration::days(14),
            Frequency::Monthly => Duration::days(30),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown frequency {:?}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub stocks: Vec<PortfolioEntry>,
    #[serde(default)]
    pub frequency: Frequency,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        User {
            username: username.into(),
            stocks: Vec::new(),
            frequency: Frequency::default(),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.stocks.iter().map(|s| s.symbol.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    #[serde(alias = "Positive", alias = "POSITIVE")]
    Positive,
    #[default]
    #[serde(alias = "Neutral", alias = "NEUTRAL")]
    Neutral,
    #[serde(alias = "Negative", alias = "NEGATIVE")]
    Negative,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Neutral => "Neutral",
            Sentiment::Negative => "Negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub first_paragraph: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
}

/// What the backend reports for one news source: the matching articles, or
/// the error text when scraping that source failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceArticles {
    Articles(Vec<NewsArticle>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceGroup {
    pub source: String,
    pub articles: Vec<NewsArticle>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub stock: String,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub prediction: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, alias = "externalFactors")]
    pub external_factors: Vec<String>,
    #[serde(default, alias = "articles")]
    pub news: BTreeMap<String, SourceArticles>,
    #[serde(default = "Utc::now", alias = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

impl AnalysisResult {
    /// Placeholder shown when the prediction service cannot be reached.
    pub fn fallback(symbol: &str) -> Self {
        AnalysisResult {
            stock: symbol.to_string(),
            sentiment: Sentiment::Neutral,
            prediction: "Prediction unavailable".to_string(),
            summary: format!(
                "We could not reach the analysis service for {}. Try again later.",
                symbol
            ),
            external_factors: Vec::new(),
            news: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn is_stale(&self, frequency: Frequency, now: DateTime<Utc>) -> bool {
        now - self.last_updated >= frequency.max_age()
    }

    pub fn source_groups(&self) -> Vec<SourceGroup> {
        self.news
            .iter()
            .map(|(source, entry)| {
                let (articles, error) = match entry {
                    SourceArticles::Articles(list) => (list.clone(), None),
                    SourceArticles::Failed(message) => (Vec::new(), Some(message.clone())),
                };
                SourceGroup {
                    source: source_name(source),
                    articles,
                    error,
                }
            })
            .collect()
    }
}

/// Sources are keyed by the page that was scraped; show just the site.
fn source_name(source: &str) -> String {
    match reqwest::Url::parse(source) {
        Ok(url) => url
            .host_str()
            .map(|h| h.trim_start_matches("www.").to_string())
            .unwrap_or_else(|| source.to_string()),
        Err(_) => source.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerInfo {
    pub symbol: String,
    pub name: String,
    pub market: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frequency_uses_kebab_case_on_the_wire() {
        assert_eq!(serde_json::to_value(Frequency::BiWeekly).unwrap(), json!("bi-weekly"));
        let parsed: Frequency = serde_json::from_value(json!("monthly")).unwrap();
        assert_eq!(parsed, Frequency::Monthly);
        assert_eq!("Bi-Weekly".parse::<Frequency>().unwrap(), Frequency::BiWeekly);
        assert!("hourly".parse::<Frequency>().is_err());
    }

    #[test]
    fn portfolio_entries_accept_strings_and_objects() {
        let user: User = serde_json::from_value(json!({
            "username": "alice",
            "stocks": ["AAPL", {"symbol": "MSFT", "name": "Microsoft Corp"}],
            "frequency": "weekly"
        }))
        .unwrap();
        assert_eq!(user.stocks[0], PortfolioEntry::new("AAPL"));
        assert_eq!(user.stocks[1].name.as_deref(), Some("Microsoft Corp"));
        assert_eq!(user.frequency, Frequency::Weekly);
        assert_eq!(user.symbols(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn user_without_portfolio_defaults_to_daily() {
        let user: User = serde_json::from_value(json!({"username": "bob"})).unwrap();
        assert!(user.stocks.is_empty());
        assert_eq!(user.frequency, Frequency::Daily);
    }

    #[test]
    fn analysis_keeps_failed_sources() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "stock": "TSLA",
            "sentiment": "Positive",
            "prediction": "Upward trend expected",
            "externalFactors": ["Tariffs"],
            "news": {
                "https://www.cnn.com/business/investing": [
                    {"title": "Tesla beats estimates", "url": "https://cnn.com/a", "first_paragraph": "..."}
                ],
                "https://www.theguardian.com/us/business": "Error: timed out"
            },
            "last_updated": "2025-03-01T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.external_factors, vec!["Tariffs"]);

        let groups = result.source_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].source, "cnn.com");
        assert_eq!(groups[0].articles.len(), 1);
        assert_eq!(groups[1].source, "theguardian.com");
        assert_eq!(groups[1].error.as_deref(), Some("Error: timed out"));
    }

    #[test]
    fn staleness_follows_frequency() {
        let mut result = AnalysisResult::fallback("AAPL");
        let now = Utc::now();
        result.last_updated = now - Duration::days(3);
        assert!(result.is_stale(Frequency::Daily, now));
        assert!(!result.is_stale(Frequency::Weekly, now));

        result.last_updated = now - Duration::days(14);
        assert!(result.is_stale(Frequency::BiWeekly, now));
        assert!(!result.is_stale(Frequency::Monthly, now));
    }
}
