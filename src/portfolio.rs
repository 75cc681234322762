// src/portfolio.rs
use crate::auth::FieldErrors;
use crate::client::Backend;
use crate::error::ApiError;
use crate::market::MarketData;
use crate::models::{Frequency, PortfolioEntry};
use log::info;

pub const POPULAR_STOCKS: [&str; 10] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA", "NVDA", "JPM", "V", "WMT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Symbols,
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved(Step),
    Submit,
}

/// Two-step portfolio wizard: pick symbols, then pick a frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioEditor {
    pub step: Step,
    pub stocks: Vec<PortfolioEntry>,
    pub frequency: Frequency,
    pub errors: FieldErrors,
}

impl PortfolioEditor {
    pub fn new(stocks: Vec<PortfolioEntry>, frequency: Frequency) -> Self {
        PortfolioEditor {
            step: Step::Symbols,
            stocks,
            frequency,
            errors: FieldErrors::new(),
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.stocks.iter().any(|s| s.symbol == symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.stocks.iter().map(|s| s.symbol.clone()).collect()
    }

    pub fn toggle(&mut self, symbol: &str) {
        if self.contains(symbol) {
            self.stocks.retain(|s| s.symbol != symbol);
        } else {
            self.stocks.push(PortfolioEntry::new(symbol));
        }
        self.errors.remove("stocks");
    }

    /// Adds a typed symbol after checking it with the market provider.
    /// Returns whether the selection changed.
    pub async fn add_custom(&mut self, raw: &str, market: &dyn MarketData) -> bool {
        let symbol = match normalize_symbol(raw) {
            Some(symbol) => symbol,
            None => return false,
        };
        if self.contains(&symbol) {
            return false;
        }
        match market.verify_symbol(&symbol).await {
            Some(info) => {
                self.stocks.push(PortfolioEntry {
                    symbol: info.symbol,
                    name: Some(info.name),
                });
                self.errors.remove("custom_stock");
                self.errors.remove("stocks");
                true
            }
            None => {
                self.errors.insert(
                    "custom_stock",
                    format!("{} is not a recognised stock symbol", symbol),
                );
                false
            }
        }
    }

    /// `None` when the current step does not validate.
    pub fn next_step(&mut self) -> Option<Advance> {
        self.errors.clear();
        match self.step {
            Step::Symbols => {
                if self.stocks.is_empty() {
                    self.errors.insert(
                        "stocks",
                        "Please select at least one stock to track".to_string(),
                    );
                    return None;
                }
                self.step = Step::Frequency;
                Some(Advance::Moved(Step::Frequency))
            }
            Step::Frequency => Some(Advance::Submit),
        }
    }

    pub fn prev_step(&mut self) {
        if self.step == Step::Frequency {
            self.step = Step::Symbols;
        }
    }
}

pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

/// Persists the wizard's selection for `username`.
pub async fn save_portfolio(
    backend: &dyn Backend,
    username: &str,
    editor: &PortfolioEditor,
) -> Result<(), ApiError> {
    let stocks = backend.update_stocks(username, &editor.symbols()).await?;
    if !stocks.success {
        return Err(ApiError::Rejected(
            stocks
                .message
                .unwrap_or_else(|| "Could not save your stocks".to_string()),
        ));
    }
    let frequency = backend.update_frequency(username, editor.frequency).await?;
    if !frequency.success {
        return Err(ApiError::Rejected(
            frequency
                .message
                .unwrap_or_else(|| "Could not save your update frequency".to_string()),
        ));
    }
    info!(
        "Saved portfolio for {}: {} symbols, {}",
        username,
        editor.stocks.len(),
        editor.frequency
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeMarket};

    #[test]
    fn toggle_adds_and_removes() {
        let mut editor = PortfolioEditor::new(Vec::new(), Frequency::Daily);
        editor.toggle("AAPL");
        editor.toggle("MSFT");
        assert_eq!(editor.symbols(), vec!["AAPL", "MSFT"]);
        editor.toggle("AAPL");
        assert_eq!(editor.symbols(), vec!["MSFT"]);
    }

    #[tokio::test]
    async fn custom_symbol_is_normalized_and_deduplicated() {
        let market = FakeMarket::with_symbols(&["SHOP"]);
        let mut editor = PortfolioEditor::new(Vec::new(), Frequency::Daily);

        assert!(editor.add_custom("  shop ", &market).await);
        assert!(!editor.add_custom("SHOP", &market).await);
        assert!(!editor.add_custom("   ", &market).await);
        assert_eq!(editor.symbols(), vec!["SHOP"]);
        assert_eq!(editor.stocks[0].name.as_deref(), Some("SHOP Corp"));
    }

    #[tokio::test]
    async fn unknown_custom_symbol_reports_error() {
        let market = FakeMarket::with_symbols(&[]);
        let mut editor = PortfolioEditor::new(Vec::new(), Frequency::Daily);

        assert!(!editor.add_custom("nope", &market).await);
        assert!(editor.stocks.is_empty());
        assert_eq!(editor.errors["custom_stock"], "NOPE is not a recognised stock symbol");
    }

    #[test]
    fn first_step_requires_a_symbol() {
        let mut editor = PortfolioEditor::new(Vec::new(), Frequency::Daily);
        assert_eq!(editor.next_step(), None);
        assert_eq!(editor.step, Step::Symbols);
        assert_eq!(editor.errors["stocks"], "Please select at least one stock to track");

        editor.toggle("TSLA");
        assert!(editor.errors.is_empty());
        assert_eq!(editor.next_step(), Some(Advance::Moved(Step::Frequency)));
        assert_eq!(editor.next_step(), Some(Advance::Submit));
    }

    #[test]
    fn back_stops_at_first_step() {
        let mut editor = PortfolioEditor::new(vec![PortfolioEntry::new("V")], Frequency::Weekly);
        editor.prev_step();
        assert_eq!(editor.step, Step::Symbols);
        editor.next_step();
        editor.prev_step();
        assert_eq!(editor.step, Step::Symbols);
    }

    #[tokio::test]
    async fn save_sends_stocks_then_frequency() {
        let backend = FakeBackend::default();
        let mut editor = PortfolioEditor::new(Vec::new(), Frequency::Monthly);
        editor.toggle("JPM");

        save_portfolio(&backend, "alice", &editor).await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls, vec!["update_stocks alice JPM", "update_frequency alice monthly"]);
    }

    #[tokio::test]
    async fn rejected_save_surfaces_backend_message() {
        let backend = FakeBackend::default();
        backend.reject_updates("User not found");
        let editor = PortfolioEditor::new(vec![PortfolioEntry::new("JPM")], Frequency::Daily);

        let err = save_portfolio(&backend, "ghost", &editor).await.unwrap_err();
        assert_eq!(err.user_message(), "User not found");
        assert_eq!(backend.calls().len(), 1);
    }
}
