//! Chromium-driven portal lookup.
//!
//! One `run` call drives a single session through an explicit sequence of
//! awaited steps, each with its own timeout: navigate, fill the search form,
//! submit, wait for the outcome, classify it. Challenge pages are solved and
//! resubmitted once; transient faults are retried with bounded backoff;
//! structural mismatches fail immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::browser::{BrowserPool, BrowserSession};
use crate::captcha::{CaptchaSolver, Challenge};
use crate::config::PortalConfig;
use crate::error::LookupError;
use crate::pipeline::ViolationSource;
use crate::violation::{Query, Violation};

use super::classify::{classify_page, map_row, PageKind, RawRow};

/// Poll interval while waiting for the results page to settle.
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Settle time after the readiness predicate first fires.
const RESULT_SETTLE: Duration = Duration::from_secs(1);

const FILL_FALLBACK_JS: &str = r#"
(function() {
    var inputs = document.querySelectorAll("input[type='text']");
    if (inputs.length >= 2) {
        inputs[1].value = PLATE;
        return true;
    }
    var byPlaceholder = document.querySelector("input[placeholder*='plate' i]");
    if (byPlaceholder) {
        byPlaceholder.value = PLATE;
        return true;
    }
    return false;
})()
"#;

const SELECT_STATE_JS: &str = r#"
(function() {
    var select = document.querySelector("select[name='state']");
    if (!select) { return false; }
    select.value = STATE;
    select.dispatchEvent(new Event("change"));
    return select.value === STATE;
})()
"#;

const SUBMIT_JS: &str = r#"
(function() {
    var buttons = document.querySelectorAll("input[type='submit'][value='SEARCH']");
    if (buttons.length >= 2) { buttons[1].click(); return true; }
    if (buttons.length === 1) { buttons[0].click(); return true; }
    var plate = document.querySelector("input[name='plateNumber']");
    if (plate && plate.form) {
        var btn = plate.form.querySelector("input[type='submit']");
        if (btn) { btn.click(); } else { plate.form.submit(); }
        return true;
    }
    return false;
})()
"#;

const RESULTS_READY_JS: &str = r#"
(function() {
    var text = document.body ? document.body.innerText.toLowerCase() : "";
    var hasOutcome = text.indexOf("violation") >= 0 ||
        text.indexOf("no records") >= 0 ||
        text.indexOf("no tickets") >= 0 ||
        text.indexOf("search results") >= 0 ||
        text.indexOf("error") >= 0 ||
        text.indexOf("invalid") >= 0;
    var urlChanged = window.location.href !== PORTAL_URL;
    return hasOutcome || urlChanged;
})()
"#;

const EXTRACT_ROWS_JS: &str = r#"
(function() {
    var out = [];
    var tables = document.querySelectorAll("table");
    for (var t = 0; t < tables.length; t++) {
        var rows = tables[t].querySelectorAll("tr");
        if (rows.length < 2) { continue; }
        var headers = [];
        var headerCells = rows[0].querySelectorAll("th, td");
        for (var h = 0; h < headerCells.length; h++) {
            headers.push(headerCells[h].innerText.trim().toLowerCase());
        }
        for (var r = 1; r < rows.length; r++) {
            var cells = rows[r].querySelectorAll("td, th");
            if (cells.length < 3) { continue; }
            var texts = [];
            for (var c = 0; c < cells.length; c++) {
                texts.push(cells[c].innerText.trim());
            }
            out.push({ headers: headers, cells: texts });
        }
    }
    return JSON.stringify(out);
})()
"#;

const INJECT_TOKEN_JS: &str = r#"
(function() {
    var token = TOKEN;
    var field = document.getElementById("g-recaptcha-response");
    if (field) {
        field.innerHTML = token;
        field.value = token;
        field.dispatchEvent(new Event("change"));
        field.dispatchEvent(new Event("input"));
    }
    if (typeof grecaptcha !== "undefined") {
        grecaptcha.getResponse = function() { return token; };
    }
    return field !== null;
})()
"#;

/// Drives one session through one lookup query.
pub struct PortalScraper {
    config: PortalConfig,
    solver: Option<Arc<dyn CaptchaSolver>>,
}

impl PortalScraper {
    pub fn new(config: PortalConfig, solver: Option<Arc<dyn CaptchaSolver>>) -> Self {
        Self { config, solver }
    }

    /// Run the lookup, retrying transient faults with bounded backoff.
    pub async fn run(
        &self,
        session: &BrowserSession,
        query: &Query,
    ) -> Result<Vec<Violation>, LookupError> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            match self.run_once(session, query).await {
                Ok(violations) => return Ok(violations),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = backoff_delay(self.config.retry_backoff_ms, attempt);
                    warn!(
                        attempt,
                        max = self.config.max_attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Portal lookup failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| LookupError::SiteUnavailable("lookup attempts exhausted".into())))
    }

    async fn run_once(
        &self,
        session: &BrowserSession,
        query: &Query,
    ) -> Result<Vec<Violation>, LookupError> {
        let page = session.page();

        self.navigate(page).await?;
        self.fill_form(page, query).await?;
        self.submit(page).await?;
        self.await_results(page).await?;

        match classify_page(&self.page_html(page).await?) {
            PageKind::EmptyResults => {
                info!(query = %query, "Portal reports clean record");
                Ok(Vec::new())
            }
            PageKind::Results => self.extract_rows(page).await,
            PageKind::Challenge { site_key } => {
                info!(query = %query, "Challenge page detected");
                self.solve_challenge(page, &site_key).await?;
                self.submit(page).await?;
                self.await_results(page).await?;

                match classify_page(&self.page_html(page).await?) {
                    PageKind::EmptyResults => Ok(Vec::new()),
                    PageKind::Results => self.extract_rows(page).await,
                    PageKind::Challenge { .. } => Err(LookupError::CaptchaUnsolvable(
                        "challenge persisted after solving".to_string(),
                    )),
                }
            }
        }
    }

    async fn navigate(&self, page: &Page) -> Result<(), LookupError> {
        let budget = Duration::from_secs(self.config.navigation_timeout_secs);
        debug!(url = %self.config.url, "Navigating to portal");

        tokio::time::timeout(budget, page.goto(self.config.url.as_str()))
            .await
            .map_err(|_| LookupError::SiteUnavailable("navigation timed out".to_string()))?
            .map_err(|e| LookupError::SiteUnavailable(format!("navigation failed: {}", e)))?;

        tokio::time::timeout(budget, page.wait_for_navigation())
            .await
            .map_err(|_| LookupError::SiteUnavailable("page load timed out".to_string()))?
            .map_err(|e| LookupError::SiteUnavailable(format!("page load failed: {}", e)))?;

        Ok(())
    }

    async fn fill_form(&self, page: &Page, query: &Query) -> Result<(), LookupError> {
        // Named input first, the portal's stable selector.
        let filled = match page.find_element("input[name='plateNumber']").await {
            Ok(element) => {
                element
                    .type_str(&query.license_plate)
                    .await
                    .map_err(|e| LookupError::Browser(format!("plate input: {}", e)))?;
                true
            }
            Err(_) => {
                let js = FILL_FALLBACK_JS
                    .replace("PLATE", &js_string(&query.license_plate));
                self.eval::<bool>(page, &js).await?
            }
        };

        if !filled {
            return Err(LookupError::ParseError(
                "license plate input not found".to_string(),
            ));
        }

        if query.state != "NY" {
            let js = SELECT_STATE_JS.replace("STATE", &js_string(&query.state));
            if !self.eval::<bool>(page, &js).await.unwrap_or(false) {
                warn!(state = %query.state, "Could not select state, portal default applies");
            }
        }

        debug!(query = %query, "Search form filled");
        Ok(())
    }

    async fn submit(&self, page: &Page) -> Result<(), LookupError> {
        if !self.eval::<bool>(page, SUBMIT_JS).await? {
            return Err(LookupError::ParseError(
                "search submit button not found".to_string(),
            ));
        }
        debug!("Search form submitted");
        Ok(())
    }

    /// Wait for the outcome page, bounded by the navigation timeout.
    async fn await_results(&self, page: &Page) -> Result<(), LookupError> {
        let budget = Duration::from_secs(self.config.navigation_timeout_secs);
        let deadline = tokio::time::Instant::now() + budget;
        let js = RESULTS_READY_JS.replace("PORTAL_URL", &js_string(&self.config.url));

        loop {
            if self.eval::<bool>(page, &js).await.unwrap_or(false) {
                tokio::time::sleep(RESULT_SETTLE).await;
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LookupError::SiteUnavailable(
                    "timed out waiting for results".to_string(),
                ));
            }
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;
        }
    }

    async fn page_html(&self, page: &Page) -> Result<String, LookupError> {
        self.eval::<String>(page, "document.documentElement.outerHTML")
            .await
    }

    async fn extract_rows(&self, page: &Page) -> Result<Vec<Violation>, LookupError> {
        let raw: String = self.eval(page, EXTRACT_ROWS_JS).await?;
        let rows: Vec<RawRow> = serde_json::from_str(&raw)
            .map_err(|e| LookupError::ParseError(format!("row extraction: {}", e)))?;

        if rows.is_empty() {
            return Err(LookupError::ParseError(
                "results page has no recognizable table".to_string(),
            ));
        }

        let violations: Vec<Violation> = rows.iter().filter_map(map_row).collect();
        if violations.is_empty() {
            return Err(LookupError::ParseError(
                "result rows did not match the expected layout".to_string(),
            ));
        }

        debug!(count = violations.len(), "Parsed violation rows");
        Ok(violations)
    }

    async fn solve_challenge(&self, page: &Page, site_key: &str) -> Result<(), LookupError> {
        let solver = self.solver.as_ref().ok_or_else(|| {
            LookupError::CaptchaUnsolvable(
                "challenge present but no solver credential configured".to_string(),
            )
        })?;

        let challenge = Challenge::new(site_key, &self.config.url);
        let token = solver.resolve(&challenge).await?;

        let js = INJECT_TOKEN_JS.replace("TOKEN", &js_string(&token));
        if !self.eval::<bool>(page, &js).await? {
            return Err(LookupError::ParseError(
                "challenge response field not found".to_string(),
            ));
        }

        info!("Challenge token injected");
        Ok(())
    }

    async fn eval<T: DeserializeOwned + Send>(
        &self,
        page: &Page,
        js: &str,
    ) -> Result<T, LookupError> {
        page.evaluate(js)
            .await
            .map_err(|e| LookupError::Browser(format!("evaluate: {}", e)))?
            .into_value::<T>()
            .map_err(|e| LookupError::Browser(format!("evaluate result: {}", e)))
    }
}

/// Escape a value for splicing into an in-page script.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).expect("string serialization cannot fail")
}

/// Exponential backoff: base * 2^(attempt-1).
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << (attempt - 1).min(16)))
}

/// The portal as a violation source: acquires a pooled session, runs the
/// scraper on it, and returns the session for reuse.
pub struct ScrapingPortal {
    pool: Arc<BrowserPool>,
    scraper: PortalScraper,
}

impl ScrapingPortal {
    pub fn new(pool: Arc<BrowserPool>, scraper: PortalScraper) -> Self {
        Self { pool, scraper }
    }
}

#[async_trait]
impl ViolationSource for ScrapingPortal {
    fn name(&self) -> &'static str {
        "portal"
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Violation>, LookupError> {
        let handle = self.pool.acquire().await?;
        let result = self.scraper.run(handle.session(), query).await;
        self.pool.release(handle).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_saturates() {
        // Large attempt counts must not overflow the shift.
        let d = backoff_delay(u64::MAX, 40);
        assert!(d >= Duration::from_millis(1));
    }

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("abc"), "\"abc\"");
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }
}
