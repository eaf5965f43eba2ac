//! Target-site driver — the capability seam between the resolution algorithm
//! and the storefront's DOM. The automation engine only ever talks to this
//! trait; the concrete selector table is injectable configuration, so the
//! cascade is testable against a substitute driver and site-structure
//! brittleness stays out of the core logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cdp::{CdpError, PageSession};

/// One entry of the storefront's item listing, as currently rendered.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ListingEntry {
    /// Position in the rendered entry list at snapshot time.
    pub index: usize,
    /// Visible display name.
    pub name: String,
}

/// What happened when the driver tried to add from the open detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddAttempt {
    /// An affirmative (or fallback) control was clicked.
    Clicked,
    /// The view is open but exposes no interactive control at all.
    NoControl,
    /// No detail view is open.
    NoView,
}

/// Site capabilities the resolution cascade needs. Nothing more.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Submit a query through the page's native search.
    async fn search(&self, query: &str) -> Result<(), CdpError>;
    /// Clear the native search field.
    async fn clear_search(&self) -> Result<(), CdpError>;
    /// Snapshot the currently rendered listing entries.
    async fn list_visible_entries(&self) -> Result<Vec<ListingEntry>, CdpError>;
    /// Reveal more of a paginated/virtualized listing.
    async fn scroll_more(&self) -> Result<(), CdpError>;
    /// Open an entry's detail/customization view.
    async fn open(&self, entry: &ListingEntry) -> Result<(), CdpError>;
    /// Is a detail/customization view currently open?
    async fn is_open_view_showing(&self) -> Result<bool, CdpError>;
    /// Click the control that adds the open item to the cart.
    async fn add_from_open_view(&self) -> Result<AddAttempt, CdpError>;
    /// Close the open detail view without adding.
    async fn close_open_view(&self) -> Result<(), CdpError>;
    /// Is a login/authentication prompt blocking the page?
    async fn is_auth_prompt_showing(&self) -> Result<bool, CdpError>;
}

/// CSS selector table for one storefront. Ships in configuration; the
/// defaults cover common storefront markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSelectors {
    /// The native search input.
    #[serde(default = "default_search_input")]
    pub search_input: String,
    /// One listing entry (search result or menu row).
    #[serde(default = "default_entry")]
    pub entry: String,
    /// The entry's display-name element, relative to the entry.
    /// Empty = use the entry's own text.
    #[serde(default = "default_entry_name")]
    pub entry_name: String,
    /// The item detail/customization view.
    #[serde(default = "default_open_view")]
    pub open_view: String,
    /// Close control inside the open view.
    #[serde(default = "default_open_view_close")]
    pub open_view_close: String,
    /// Login prompt detection.
    #[serde(default = "default_auth_prompt")]
    pub auth_prompt: String,
}

fn default_search_input() -> String {
    "input[type=search], input[name=search], input[placeholder*=earch]".into()
}
fn default_entry() -> String {
    "[data-testid*=item], [class*=menu-item], [class*=product-card], li[class*=item]".into()
}
fn default_entry_name() -> String {
    "h3, h4, [class*=name], [class*=title]".into()
}
fn default_open_view() -> String {
    "[role=dialog], [class*=modal], [class*=item-detail]".into()
}
fn default_open_view_close() -> String {
    "[aria-label=Close], [class*=close], button[class*=dismiss]".into()
}
fn default_auth_prompt() -> String {
    "input[type=password], [class*=login-modal], [data-testid*=login]".into()
}

impl Default for DriverSelectors {
    fn default() -> Self {
        Self {
            search_input: default_search_input(),
            entry: default_entry(),
            entry_name: default_entry_name(),
            open_view: default_open_view(),
            open_view_close: default_open_view_close(),
            auth_prompt: default_auth_prompt(),
        }
    }
}

/// Phrases whose presence on a control affirms addition.
const ADD_PATTERN: &str = r"add\s+to\s+(cart|order|bag|basket)|add\s+(item|\d+)|^add$";

/// StoreDriver over a live CDP page session.
pub struct CdpStoreDriver {
    session: PageSession,
    selectors: DriverSelectors,
}

impl CdpStoreDriver {
    pub fn new(session: PageSession, selectors: DriverSelectors) -> Self {
        Self { session, selectors }
    }

    pub fn session(&self) -> &PageSession {
        &self.session
    }

    /// Embed a string as a JS literal.
    fn js_str(s: &str) -> String {
        serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
    }
}

#[async_trait]
impl StoreDriver for CdpStoreDriver {
    async fn search(&self, query: &str) -> Result<(), CdpError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                el.value = {query};
                el.dispatchEvent(new Event('input', {{bubbles: true}}));
                const form = el.closest('form');
                if (form && form.requestSubmit) form.requestSubmit();
                else el.dispatchEvent(new KeyboardEvent('keydown', {{key: 'Enter', bubbles: true}}));
                return true;
            }})()"#,
            sel = Self::js_str(&self.selectors.search_input),
            query = Self::js_str(query),
        );
        let found = self.session.evaluate(&script).await?;
        if found.as_bool() != Some(true) {
            return Err(CdpError::InvalidResponse("Search input not found".into()));
        }
        Ok(())
    }

    async fn clear_search(&self) -> Result<(), CdpError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return;
                el.value = '';
                el.dispatchEvent(new Event('input', {{bubbles: true}}));
            }})()"#,
            sel = Self::js_str(&self.selectors.search_input),
        );
        self.session.evaluate(&script).await?;
        Ok(())
    }

    async fn list_visible_entries(&self) -> Result<Vec<ListingEntry>, CdpError> {
        let script = format!(
            r#"Array.from(document.querySelectorAll({entry})).map((el, i) => ({{
                index: i,
                name: ((el.querySelector({name}) || el).textContent || '').trim(),
            }}))"#,
            entry = Self::js_str(&self.selectors.entry),
            name = Self::js_str(&self.selectors.entry_name),
        );
        let value = self.session.evaluate(&script).await?;
        let entries: Vec<ListingEntry> = serde_json::from_value(value).unwrap_or_default();
        Ok(entries)
    }

    async fn scroll_more(&self) -> Result<(), CdpError> {
        let script = format!(
            r#"(() => {{
                const entries = document.querySelectorAll({entry});
                const last = entries[entries.length - 1];
                if (last) last.scrollIntoView({{block: 'end'}});
                window.scrollBy(0, window.innerHeight);
            }})()"#,
            entry = Self::js_str(&self.selectors.entry),
        );
        self.session.evaluate(&script).await?;
        Ok(())
    }

    async fn open(&self, entry: &ListingEntry) -> Result<(), CdpError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelectorAll({sel})[{index}];
                if (!el) return false;
                el.scrollIntoView({{block: 'center'}});
                el.click();
                return true;
            }})()"#,
            sel = Self::js_str(&self.selectors.entry),
            index = entry.index,
        );
        let clicked = self.session.evaluate(&script).await?;
        if clicked.as_bool() != Some(true) {
            return Err(CdpError::InvalidResponse(format!(
                "Listing entry {} no longer present",
                entry.index
            )));
        }
        Ok(())
    }

    async fn is_open_view_showing(&self) -> Result<bool, CdpError> {
        let script = format!(
            "!!document.querySelector({})",
            Self::js_str(&self.selectors.open_view)
        );
        Ok(self.session.evaluate(&script).await?.as_bool() == Some(true))
    }

    async fn add_from_open_view(&self) -> Result<AddAttempt, CdpError> {
        let script = format!(
            r#"(() => {{
                const view = document.querySelector({view});
                if (!view) return 'no-view';
                const controls = Array.from(
                    view.querySelectorAll('button, [role=button], input[type=submit]')
                );
                const affirm = new RegExp({pattern}, 'i');
                let target = controls.find(c =>
                    affirm.test(((c.textContent || c.value || '')).trim()));
                // Fall back to the last interactive control within the view.
                if (!target) target = controls[controls.length - 1];
                if (!target) return 'no-control';
                target.click();
                return 'clicked';
            }})()"#,
            view = Self::js_str(&self.selectors.open_view),
            pattern = Self::js_str(ADD_PATTERN),
        );
        let result = self.session.evaluate(&script).await?;
        Ok(match result.as_str() {
            Some("clicked") => AddAttempt::Clicked,
            Some("no-control") => AddAttempt::NoControl,
            _ => AddAttempt::NoView,
        })
    }

    async fn close_open_view(&self) -> Result<(), CdpError> {
        let script = format!(
            r#"(() => {{
                const view = document.querySelector({view});
                if (!view) return;
                const close = view.querySelector({close});
                if (close) close.click();
                else document.dispatchEvent(
                    new KeyboardEvent('keydown', {{key: 'Escape', bubbles: true}}));
            }})()"#,
            view = Self::js_str(&self.selectors.open_view),
            close = Self::js_str(&self.selectors.open_view_close),
        );
        self.session.evaluate(&script).await?;
        Ok(())
    }

    async fn is_auth_prompt_showing(&self) -> Result<bool, CdpError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return !!(el && el.offsetParent !== null);
            }})()"#,
            sel = Self::js_str(&self.selectors.auth_prompt),
        );
        Ok(self.session.evaluate(&script).await?.as_bool() == Some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_defaults_fill_in() {
        let sel: DriverSelectors = serde_json::from_str(r#"{"entry": ".row"}"#).unwrap();
        assert_eq!(sel.entry, ".row");
        assert!(sel.search_input.contains("search"));
        assert!(sel.auth_prompt.contains("password"));
    }

    #[test]
    fn test_js_string_escaping() {
        let lit = CdpStoreDriver::js_str(r#"it's a "test""#);
        assert_eq!(lit, r#""it's a \"test\"""#);
    }

    #[test]
    fn test_add_pattern_embeds_as_js_literal() {
        // The pattern travels into the page as a RegExp source string; it
        // must survive JSON embedding unmangled.
        let lit = CdpStoreDriver::js_str(ADD_PATTERN);
        assert!(lit.starts_with('"') && lit.ends_with('"'));
        assert!(lit.contains("cart|order|bag|basket"));
    }
}
