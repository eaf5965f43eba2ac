//! Automation engine — one Chrome session per run.
//!
//! Protocol: bootstrap the session (persistent profile skips login),
//! navigate and verify the destination, wait out the authentication gate,
//! then resolve each requested item independently through the search→scroll
//! cascade. The session is deliberately left open afterwards, whatever the
//! outcome, so the operator can review the cart and check out by hand.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use cartpilot_core::config::BrowserConfig;
use cartpilot_core::outcome::{ExecutionOutcome, TriggeredBy};

use crate::cdp::{CdpClient, CdpError};
use crate::driver::{AddAttempt, CdpStoreDriver, DriverSelectors, StoreDriver};
use crate::fuzzy;
use crate::launcher::ChromeLauncher;

/// Settle time after a search submit or scroll step, before re-reading
/// the listing.
const SETTLE: Duration = Duration::from_millis(1500);
/// Poll cadence for the bounded waits (auth gate, detail view).
const POLL: Duration = Duration::from_millis(500);

/// Errors that abort a run (or reject it before one starts).
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Rejected before any browser work.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another run is in flight. Requests are never queued.
    #[error("An order run is already in progress")]
    AlreadyRunning,

    /// Landed somewhere other than the expected site, or navigation broke.
    #[error("Navigation failure: {0}")]
    NavigationFailure(String),

    /// The login prompt never went away within the bounded wait.
    #[error("Timed out waiting for login to complete")]
    AuthenticationTimeout,

    /// Browser/CDP transport failure.
    #[error("Browser error: {0}")]
    Browser(#[from] CdpError),
}

/// One order run's input.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub store_url: String,
    pub store_name: String,
    pub items: Vec<String>,
    pub special_instructions: String,
    pub headless: bool,
    /// Persistent profile directory; None = the configured default.
    pub profile_dir: Option<PathBuf>,
    pub triggered_by: TriggeredBy,
}

/// Drives order runs. One active run process-wide; concurrent requests are
/// rejected immediately with [`AutomationError::AlreadyRunning`].
pub struct AutomationEngine {
    config: BrowserConfig,
    selectors: DriverSelectors,
    in_flight: Arc<AtomicBool>,
}

/// RAII release of the in-flight flag.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AutomationEngine {
    pub fn new(config: BrowserConfig, selectors: DriverSelectors) -> Self {
        Self {
            config,
            selectors,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claim the in-flight flag, or fail fast.
    fn begin(&self) -> Result<InFlightGuard, AutomationError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AutomationError::AlreadyRunning)?;
        Ok(InFlightGuard(self.in_flight.clone()))
    }

    /// Run one order. Exactly one [`ExecutionOutcome`] describes every run
    /// that starts; a rejected concurrent request starts no run.
    pub async fn execute(&self, request: OrderRequest) -> Result<ExecutionOutcome, AutomationError> {
        let expected = validate_store_url(&request.store_url)?;
        let _guard = self.begin()?;

        info!(
            "🛒 Order run starting: {} item(s) at {}",
            request.items.len(),
            request.store_name
        );

        // 1. Bootstrap the browser session.
        let launcher = ChromeLauncher::new(
            self.config.debug_port,
            request
                .profile_dir
                .clone()
                .unwrap_or_else(|| self.config.get_profile_dir()),
            request.headless,
        );
        launcher.ensure_running().await?;
        let client = CdpClient::connect(&launcher.endpoint()).await?;
        let page = client.new_page().await?;

        // 2. Navigate and verify we are still on the expected site.
        page.navigate(&request.store_url)
            .await
            .map_err(|e| AutomationError::NavigationFailure(e.to_string()))?;
        let landed = page.current_url().await?;
        if !same_site(&expected, &landed) {
            return Err(AutomationError::NavigationFailure(format!(
                "Expected {}, landed on {}",
                expected.host_str().unwrap_or("?"),
                landed
            )));
        }

        let driver = CdpStoreDriver::new(page, self.selectors.clone());

        // 3. Authentication gate — external/manual resolution only.
        self.wait_for_auth(&driver).await?;

        // 4–6. Item cascade and classification. The session stays open.
        let fulfilled = self.resolve_items(&driver, &request.items).await;
        let outcome = ExecutionOutcome::classify(
            request.items.len(),
            fulfilled,
            request.triggered_by,
            Some(format!(
                "Added {fulfilled} of {} item(s) to the cart",
                request.items.len()
            )),
        );
        info!(
            "🛒 Order run finished: {:?} ({}/{})",
            outcome.status, outcome.items_fulfilled, outcome.items_requested
        );
        Ok(outcome)
    }

    /// Wait (bounded) for any login prompt to disappear.
    pub(crate) async fn wait_for_auth(
        &self,
        driver: &dyn StoreDriver,
    ) -> Result<(), AutomationError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.auth_wait_secs);
        let mut announced = false;
        loop {
            if !driver.is_auth_prompt_showing().await? {
                return Ok(());
            }
            if !announced {
                info!("🔑 Login required — waiting for you to sign in…");
                announced = true;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AutomationError::AuthenticationTimeout);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Resolve every requested item independently; per-item failures never
    /// abort the run. Returns the fulfilled count.
    pub(crate) async fn resolve_items(&self, driver: &dyn StoreDriver, items: &[String]) -> usize {
        let mut fulfilled = 0;
        for item in items {
            match self.resolve_item(driver, item).await {
                Ok(true) => {
                    info!("✅ Added: {}", item);
                    fulfilled += 1;
                }
                Ok(false) => warn!("❌ Not found: {}", item),
                Err(e) => warn!("❌ Failed on '{}': {}", item, e),
            }
        }
        fulfilled
    }

    /// Two-strategy cascade for one item: native search first, then
    /// incremental scrolling. First success wins.
    async fn resolve_item(&self, driver: &dyn StoreDriver, item: &str) -> Result<bool, CdpError> {
        if self.try_search_strategy(driver, item).await? {
            return Ok(true);
        }
        self.try_scroll_strategy(driver, item).await
    }

    async fn try_search_strategy(
        &self,
        driver: &dyn StoreDriver,
        item: &str,
    ) -> Result<bool, CdpError> {
        if let Err(e) = driver.search(item).await {
            debug!("Search strategy unavailable: {}", e);
            return Ok(false);
        }
        tokio::time::sleep(SETTLE).await;

        let added = match self.open_first_match(driver, item).await {
            Ok(added) => added,
            Err(e) => {
                // Leave the page in a sane state before the scroll strategy.
                driver.clear_search().await.ok();
                return Err(e);
            }
        };
        // Clear the search field regardless of outcome.
        driver.clear_search().await.ok();
        Ok(added)
    }

    async fn try_scroll_strategy(
        &self,
        driver: &dyn StoreDriver,
        item: &str,
    ) -> Result<bool, CdpError> {
        for step in 0..=self.config.scroll_steps {
            if self.open_first_match(driver, item).await? {
                return Ok(true);
            }
            if step == self.config.scroll_steps {
                break;
            }
            driver.scroll_more().await?;
            tokio::time::sleep(SETTLE).await;
        }
        Ok(false)
    }

    /// Fuzzy-match the rendered listing; on a hit, open the entry and run the
    /// add-to-cart handler.
    async fn open_first_match(
        &self,
        driver: &dyn StoreDriver,
        item: &str,
    ) -> Result<bool, CdpError> {
        let entries = driver.list_visible_entries().await?;
        let Some(entry) = entries.iter().find(|e| fuzzy::is_match(&e.name, item)) else {
            return Ok(false);
        };
        debug!("Matched '{}' → '{}'", item, entry.name);
        driver.open(entry).await?;
        self.add_to_cart(driver).await
    }

    /// Wait (bounded) for the detail view, then click whatever affirms
    /// addition; close the view and report failure if nothing does.
    async fn add_to_cart(&self, driver: &dyn StoreDriver) -> Result<bool, CdpError> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.modal_wait_secs);
        while !driver.is_open_view_showing().await? {
            if tokio::time::Instant::now() >= deadline {
                debug!("Detail view never appeared");
                return Ok(false);
            }
            tokio::time::sleep(POLL).await;
        }

        match driver.add_from_open_view().await? {
            AddAttempt::Clicked => Ok(true),
            AddAttempt::NoControl | AddAttempt::NoView => {
                driver.close_open_view().await.ok();
                Ok(false)
            }
        }
    }
}

/// Reject malformed destinations before any browser work.
fn validate_store_url(raw: &str) -> Result<Url, AutomationError> {
    if raw.trim().is_empty() {
        return Err(AutomationError::Validation("Store URL is required".into()));
    }
    let url = Url::parse(raw)
        .map_err(|e| AutomationError::Validation(format!("Invalid store URL: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AutomationError::Validation(format!(
            "Unsupported URL scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(AutomationError::Validation("Store URL has no host".into()));
    }
    Ok(url)
}

/// Is the landed URL still within the expected site? Subdomain moves
/// (www, order.) are fine; a different registrable host is not.
fn same_site(expected: &Url, landed: &str) -> bool {
    let Ok(landed) = Url::parse(landed) else {
        return false;
    };
    let (Some(a), Some(b)) = (expected.host_str(), landed.host_str()) else {
        return false;
    };
    let a = a.trim_start_matches("www.");
    let b = b.trim_start_matches("www.");
    a == b || b.ends_with(&format!(".{a}")) || a.ends_with(&format!(".{b}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ListingEntry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted storefront: items visible in search results, items revealed
    /// per scroll step, and whether the detail view yields an add control.
    struct FakeStore {
        search_results: Vec<&'static str>,
        scroll_reveals: Vec<&'static str>,
        add_control_present: bool,
        auth_prompt: bool,
        state: Mutex<FakeState>,
    }

    #[derive(Default)]
    struct FakeState {
        searched: Vec<String>,
        cleared: usize,
        scrolls: usize,
        opened: Vec<String>,
        view_open: bool,
        closed_views: usize,
    }

    impl FakeStore {
        fn new(search: Vec<&'static str>, scroll: Vec<&'static str>) -> Self {
            Self {
                search_results: search,
                scroll_reveals: scroll,
                add_control_present: true,
                auth_prompt: false,
                state: Mutex::new(FakeState::default()),
            }
        }
    }

    #[async_trait]
    impl StoreDriver for FakeStore {
        async fn search(&self, query: &str) -> Result<(), CdpError> {
            self.state.lock().unwrap().searched.push(query.to_string());
            Ok(())
        }

        async fn clear_search(&self) -> Result<(), CdpError> {
            self.state.lock().unwrap().cleared += 1;
            Ok(())
        }

        async fn list_visible_entries(&self) -> Result<Vec<ListingEntry>, CdpError> {
            let st = self.state.lock().unwrap();
            // While a search is pending (submitted but not cleared more
            // often), show search results; otherwise show the listing as
            // revealed by scrolling so far.
            let names: Vec<&str> = if st.searched.len() > st.cleared {
                self.search_results.clone()
            } else {
                self.scroll_reveals
                    .iter()
                    .take(st.scrolls + 1)
                    .copied()
                    .collect()
            };
            Ok(names
                .into_iter()
                .enumerate()
                .map(|(index, name)| ListingEntry {
                    index,
                    name: name.to_string(),
                })
                .collect())
        }

        async fn scroll_more(&self) -> Result<(), CdpError> {
            self.state.lock().unwrap().scrolls += 1;
            Ok(())
        }

        async fn open(&self, entry: &ListingEntry) -> Result<(), CdpError> {
            let mut st = self.state.lock().unwrap();
            st.opened.push(entry.name.clone());
            st.view_open = true;
            Ok(())
        }

        async fn is_open_view_showing(&self) -> Result<bool, CdpError> {
            Ok(self.state.lock().unwrap().view_open)
        }

        async fn add_from_open_view(&self) -> Result<AddAttempt, CdpError> {
            let mut st = self.state.lock().unwrap();
            st.view_open = false;
            Ok(if self.add_control_present {
                AddAttempt::Clicked
            } else {
                AddAttempt::NoControl
            })
        }

        async fn close_open_view(&self) -> Result<(), CdpError> {
            let mut st = self.state.lock().unwrap();
            st.view_open = false;
            st.closed_views += 1;
            Ok(())
        }

        async fn is_auth_prompt_showing(&self) -> Result<bool, CdpError> {
            Ok(self.auth_prompt)
        }
    }

    fn engine() -> AutomationEngine {
        AutomationEngine::new(BrowserConfig::default(), DriverSelectors::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_fulfillment() {
        let store = FakeStore::new(vec!["Chicken Burrito Bowl"], vec![]);
        let fulfilled = engine()
            .resolve_items(&store, &["Chicken Bowl".into(), "Unicorn Steak".into()])
            .await;
        assert_eq!(fulfilled, 1);

        let st = store.state.lock().unwrap();
        assert_eq!(st.opened, vec!["Chicken Burrito Bowl"]);
        // The search field is cleared after each search attempt.
        assert_eq!(st.cleared, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_request_is_trivially_done() {
        let store = FakeStore::new(vec![], vec![]);
        let fulfilled = engine().resolve_items(&store, &[]).await;
        assert_eq!(fulfilled, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_strategy_fallback() {
        // Search shows nothing useful; the item appears on the third reveal.
        let store = FakeStore::new(vec!["Soda"], vec!["Fries", "Salad", "Veggie Burger"]);
        let fulfilled = engine().resolve_items(&store, &["Veggie Burger".into()]).await;
        assert_eq!(fulfilled, 1);

        let st = store.state.lock().unwrap();
        assert_eq!(st.scrolls, 2);
        assert_eq!(st.opened, vec!["Veggie Burger"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_add_control_closes_view_and_fails_item() {
        let mut store = FakeStore::new(vec!["Chicken Bowl"], vec![]);
        store.add_control_present = false;
        let fulfilled = engine().resolve_items(&store, &["Chicken Bowl".into()]).await;
        assert_eq!(fulfilled, 0);
        // Open view is closed after the failed attempt. The scroll strategy
        // then retries once more against the base listing.
        assert!(store.state.lock().unwrap().closed_views >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_gate_times_out() {
        let mut store = FakeStore::new(vec![], vec![]);
        store.auth_prompt = true;
        let err = engine().wait_for_auth(&store).await.unwrap_err();
        assert!(matches!(err, AutomationError::AuthenticationTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_gate_passes_when_clear() {
        let store = FakeStore::new(vec![], vec![]);
        assert!(engine().wait_for_auth(&store).await.is_ok());
    }

    #[test]
    fn test_in_flight_guard_rejects_second_run() {
        let eng = engine();
        let guard = eng.begin().unwrap();
        assert!(matches!(eng.begin(), Err(AutomationError::AlreadyRunning)));
        drop(guard);
        assert!(eng.begin().is_ok());
    }

    #[test]
    fn test_validate_store_url() {
        assert!(validate_store_url("https://shop.example.com/menu").is_ok());
        assert!(matches!(
            validate_store_url(""),
            Err(AutomationError::Validation(_))
        ));
        assert!(matches!(
            validate_store_url("not a url"),
            Err(AutomationError::Validation(_))
        ));
        assert!(matches!(
            validate_store_url("ftp://shop.example.com"),
            Err(AutomationError::Validation(_))
        ));
    }

    #[test]
    fn test_same_site() {
        let expected = Url::parse("https://shop.example.com").unwrap();
        assert!(same_site(&expected, "https://shop.example.com/menu"));
        assert!(same_site(&expected, "https://www.shop.example.com/"));
        assert!(same_site(&expected, "https://order.shop.example.com/"));
        assert!(!same_site(&expected, "https://evil.example.net/"));
    }
}
