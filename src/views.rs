// src/views.rs
use crate::analysis::{AnalysisView, ChartRange};
use crate::auth::FieldErrors;
use crate::chart::render_svg;
use crate::models::Frequency;
use crate::portfolio::{PortfolioEditor, Step, POPULAR_STOCKS};
use crate::session::{AuthMode, DashboardState, Tab};
use std::fmt::Write;

const STYLE: &str = "body{font-family:sans-serif;max-width:60rem;margin:2rem auto;color:#1f2933}\
.error-message{color:#b42318}.notice{background:#ecfdf3;padding:.5rem 1rem}\
.tabs form,.inline{display:inline}.active{font-weight:bold}.selected{background:#1d4ed8;color:#fff}\
.prediction-badge{padding:.2rem .6rem;border-radius:1rem}.positive{background:#d1fadf}\
.neutral{background:#eef2f6}.negative{background:#fee4e2}\
.price-chart polyline.trend-up{stroke:#039855}.price-chart polyline.trend-down{stroke:#d92d20}";

/// Scraped URLs are only linked when they point at a web page.
fn web_link(url: &str) -> Option<&str> {
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(url),
        _ => None,
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title><style>{}</style></head><body>{}</body></html>",
        escape(title),
        STYLE,
        body
    )
}

fn error_message(errors: &FieldErrors, field: &str) -> String {
    match errors.get(field) {
        Some(message) => format!("<div class=\"error-message\">{}</div>", escape(message)),
        None => String::new(),
    }
}

fn button_form(action: &str, label: &str, hidden: &[(&str, &str)], class: &str) -> String {
    let mut form = format!("<form class=\"inline\" method=\"post\" action=\"{}\">", escape(action));
    for (name, value) in hidden {
        let _ = write!(
            form,
            "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
            escape(name),
            escape(value)
        );
    }
    let _ = write!(form, "<button class=\"{}\">{}</button></form>", class, escape(label));
    form
}

/// Whole page for the session's current screen.
pub fn render(state: &DashboardState, backend_status: Option<&str>) -> String {
    if state.is_authenticated() {
        page("Stock Prediction Dashboard", &main_app(state, backend_status))
    } else {
        page("Sign In", &auth_form(state))
    }
}

pub fn error_page(status: u16, message: &str) -> String {
    page(
        "Error",
        &format!(
            "<h2>Error {}</h2><p class=\"error-message\">{}</p><p><a href=\"/\">Back to dashboard</a></p>",
            status,
            escape(message)
        ),
    )
}

fn notice(state: &DashboardState) -> String {
    match &state.notice {
        Some(text) => format!("<div class=\"notice\">{}</div>", escape(text)),
        None => String::new(),
    }
}

fn auth_form(state: &DashboardState) -> String {
    let signup = state.auth_mode == AuthMode::SignUp;
    let title = if signup { "Create Account" } else { "Sign In" };
    let mut html = format!("<div class=\"form-container\"><h2>{}</h2>{}", title, notice(state));

    let _ = write!(
        html,
        "<form method=\"post\" action=\"/auth\">\
         <label>Username <input name=\"username\" value=\"{}\" placeholder=\"Enter your username\"></label>{}\
         <label>Password <input type=\"password\" name=\"password\" placeholder=\"Enter your password\"></label>{}",
        escape(&state.form_username),
        error_message(&state.errors, "username"),
        error_message(&state.errors, "password"),
    );
    if signup {
        let _ = write!(
            html,
            "<label>Confirm Password <input type=\"password\" name=\"confirm_password\" placeholder=\"Confirm your password\"></label>{}",
            error_message(&state.errors, "confirm_password"),
        );
    }
    let _ = write!(html, "<button class=\"primary-button\">{}</button></form>", title);
    html.push_str(&error_message(&state.errors, "form"));

    let (prompt, switch) = if signup {
        ("Already have an account? ", "Sign In")
    } else {
        ("Don't have an account? ", "Sign Up")
    };
    let _ = write!(
        html,
        "<div class=\"auth-switch\">{}{}</div></div>",
        escape(prompt),
        button_form("/auth/mode", switch, &[], "text-button")
    );
    html
}

fn main_app(state: &DashboardState, backend_status: Option<&str>) -> String {
    let mut html = format!(
        "<div class=\"app-header\"><h1>Stock Prediction Dashboard</h1><span class=\"username\">{}</span> {}</div>",
        escape(state.username().unwrap_or_default()),
        button_form("/signout", "Sign Out", &[], "sign-out-button")
    );
    let _ = write!(
        html,
        "<p class=\"backend-status\">Backend Status: {}</p>",
        escape(backend_status.unwrap_or("Connecting..."))
    );
    if state.account_created {
        html.push_str("<div class=\"notice\"><h2>Account Created Successfully!</h2></div>");
    }
    html.push_str(&notice(state));

    html.push_str("<div class=\"tabs\">");
    for (tab, name, label) in [
        (Tab::Portfolio, "portfolio", "Portfolio"),
        (Tab::Analysis, "analysis", "Analysis"),
        (Tab::Account, "account", "Account"),
    ] {
        let class = if state.tab == tab { "tab-button active" } else { "tab-button" };
        html.push_str(&button_form(&format!("/tab/{}", name), label, &[], class));
    }
    html.push_str("</div><div class=\"tab-content\">");

    html.push_str(&match state.tab {
        Tab::Portfolio => portfolio_tab(state),
        Tab::Analysis => analysis_tab(state),
        Tab::Account => account_tab(state),
    });
    html.push_str("</div>");
    html
}

fn portfolio_tab(state: &DashboardState) -> String {
    let mut html = String::from("<h2>Your Stock Portfolio</h2>");
    if let Some(editor) = &state.editor {
        html.push_str(&editor_form(editor));
        return html;
    }

    html.push_str("<div class=\"stocks-list\">");
    for entry in state.portfolio() {
        let name = entry
            .name
            .as_deref()
            .map(|n| format!(" <span class=\"stock-name\">{}</span>", escape(n)))
            .unwrap_or_default();
        let _ = write!(
            html,
            "<div class=\"portfolio-stock-item\"><span class=\"stock-symbol\">{}</span>{} {}</div>",
            escape(&entry.symbol),
            name,
            button_form(&format!("/analysis/{}", entry.symbol), "Analyze", &[], "analyze-button")
        );
    }
    let _ = write!(
        html,
        "</div><p>Updates: {}</p>{}",
        state.frequency().label(),
        button_form("/portfolio/edit", "Edit Portfolio", &[], "primary-button")
    );
    html
}

fn editor_form(editor: &PortfolioEditor) -> String {
    let mut html = String::from("<div class=\"portfolio-form\">");
    match editor.step {
        Step::Symbols => {
            html.push_str(
                "<p class=\"form-description\">Select stocks to add to your portfolio for analysis and predictions.</p>\
                 <label>Popular Stocks</label><div class=\"stocks-grid\">",
            );
            for symbol in POPULAR_STOCKS {
                let class = if editor.contains(symbol) { "stock-button selected" } else { "stock-button" };
                html.push_str(&button_form("/portfolio/toggle", symbol, &[("symbol", symbol)], class));
            }
            let _ = write!(
                html,
                "</div><form method=\"post\" action=\"/portfolio/custom\">\
                 <label>Add Custom Stock <input name=\"symbol\" placeholder=\"Enter stock symbol\"></label>\
                 <button class=\"add-button\">Add</button></form>{}",
                error_message(&editor.errors, "custom_stock")
            );
            if !editor.stocks.is_empty() {
                html.push_str("<label>Selected Stocks</label><div class=\"selected-stocks-container\">");
                for entry in &editor.stocks {
                    let _ = write!(
                        html,
                        "<span class=\"selected-stock\">{} {}</span>",
                        escape(&entry.symbol),
                        button_form("/portfolio/toggle", "×", &[("symbol", entry.symbol.as_str())], "remove-stock")
                    );
                }
                html.push_str("</div>");
            }
            html.push_str(&error_message(&editor.errors, "stocks"));
            html.push_str(&button_form("/portfolio/next", "Next", &[], "primary-button"));
        }
        Step::Frequency => {
            html.push_str(
                "<h3>Update Frequency</h3><p class=\"form-description\">How often would you like to receive stock updates and predictions?</p>\
                 <form method=\"post\" action=\"/portfolio/next\"><div class=\"frequency-options\">",
            );
            for option in Frequency::ALL {
                let checked = if option == editor.frequency { " checked" } else { "" };
                let _ = write!(
                    html,
                    "<label class=\"frequency-option\"><input type=\"radio\" name=\"frequency\" value=\"{}\"{}> {}</label>",
                    option.as_str(),
                    checked,
                    option.label()
                );
            }
            html.push_str("</div><button class=\"primary-button\">Save Portfolio</button></form>");
            html.push_str(&error_message(&editor.errors, "form"));
            html.push_str(&button_form("/portfolio/back", "Back", &[], "secondary-button"));
        }
    }
    html.push_str("</div>");
    html
}

fn analysis_tab(state: &DashboardState) -> String {
    let mut html = String::from("<h2>Stock Analysis &amp; Predictions</h2>");
    let view = match (&state.selected, &state.view) {
        (Some(selected), Some(view)) if &view.symbol == selected => view,
        _ => {
            html.push_str("<div class=\"select-stock-prompt\"><p>Select a stock from your portfolio to analyze.</p>");
            if state.portfolio().is_empty() {
                html.push_str(&button_form("/tab/portfolio", "Create Your Portfolio First", &[], "primary-button"));
            } else {
                for entry in state.portfolio() {
                    html.push_str(&button_form(
                        &format!("/analysis/{}", entry.symbol),
                        &entry.symbol,
                        &[],
                        "stock-button",
                    ));
                }
            }
            html.push_str("</div>");
            return html;
        }
    };
    html.push_str(&analysis_results(view));
    html
}

fn analysis_results(view: &AnalysisView) -> String {
    let result = &view.result;
    let symbol = escape(&view.symbol);
    let mut html = format!(
        "<div class=\"analysis-results\"><div class=\"stock-header\"><h3>{}</h3>\
         <span class=\"prediction-badge {}\">{}</span></div>",
        symbol,
        result.sentiment.as_str(),
        escape(&result.prediction)
    );
    if view.degraded {
        html.push_str("<p class=\"error-message\">Live analysis is unavailable; showing placeholder data.</p>");
    }

    html.push_str("<div class=\"chart-ranges\">");
    for range in ChartRange::ALL {
        let class = if range == view.range { "active" } else { "" };
        html.push_str(&button_form(
            &format!("/analysis/{}", view.symbol),
            range.label(),
            &[("range", range.as_str())],
            class,
        ));
    }
    html.push_str("</div>");
    html.push_str(&render_svg(&view.history, 600, 200));

    if let Some(quote) = &view.quote {
        let _ = write!(
            html,
            "<p class=\"previous-close\">Previous close: {:.2} (open {:.2}, high {:.2}, low {:.2}, volume {:.0})</p>",
            quote.close, quote.open, quote.high, quote.low, quote.volume
        );
    }

    if !result.external_factors.is_empty() {
        html.push_str("<div class=\"analysis-section\"><h4>External Factors</h4><ul>");
        for factor in &result.external_factors {
            let _ = write!(html, "<li>{}</li>", escape(factor));
        }
        html.push_str("</ul></div>");
    }

    html.push_str("<div class=\"analysis-section\"><h4>News Article Analysis</h4>");
    let groups = result.source_groups();
    if groups.is_empty() {
        html.push_str("<p>No matching articles.</p>");
    }
    for group in groups {
        let _ = write!(html, "<div class=\"news-source\"><h5>{}</h5>", escape(&group.source));
        if let Some(error) = &group.error {
            let _ = write!(html, "<p class=\"error-message\">{}</p>", escape(error));
        } else if group.articles.is_empty() {
            html.push_str("<p>No matching articles.</p>");
        }
        for article in &group.articles {
            let sentiment = article.sentiment.unwrap_or_default();
            let title = match web_link(&article.url) {
                Some(url) => format!("<a href=\"{}\">{}</a>", escape(url), escape(&article.title)),
                None => format!("<span class=\"article-title\">{}</span>", escape(&article.title)),
            };
            let _ = write!(
                html,
                "<div class=\"article-item {}\">{}<p>{}</p><span>{}</span></div>",
                sentiment.as_str(),
                title,
                escape(&article.first_paragraph),
                sentiment.label()
            );
        }
        html.push_str("</div>");
    }
    html.push_str("</div>");

    let _ = write!(
        html,
        "<div class=\"prediction-summary\"><h4>Summary</h4>\
         <p>Based on news analysis and market indicators, we predict a {} movement for {}.</p><p>{}</p>\
         <p class=\"updated\">Last updated {}</p></div>{}</div>",
        result.sentiment.as_str(),
        symbol,
        escape(&result.summary),
        result.last_updated.format("%Y-%m-%d %H:%M UTC"),
        button_form("/analysis/clear", "Analyze Another Stock", &[], "secondary-button")
    );
    html
}

fn account_tab(state: &DashboardState) -> String {
    format!(
        "<h2>Account</h2>\
         <form method=\"post\" action=\"/account/username\"><h3>Change Username</h3>\
         <label>New username <input name=\"new_username\"></label>{}\
         <button class=\"primary-button\">Update Username</button></form>\
         <form method=\"post\" action=\"/account/password\"><h3>Change Password</h3>\
         <label>New password <input type=\"password\" name=\"password\"></label>{}\
         <label>Confirm password <input type=\"password\" name=\"confirm_password\"></label>{}\
         <button class=\"primary-button\">Update Password</button></form>",
        error_message(&state.errors, "username"),
        error_message(&state.errors, "password"),
        error_message(&state.errors, "confirm_password"),
    )
}
