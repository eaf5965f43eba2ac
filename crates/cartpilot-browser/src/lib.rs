//! # CartPilot Browser
//!
//! The automation execution engine: drives one Chrome session per run over
//! the Chrome DevTools Protocol, resolves each requested item through a
//! search-then-scroll cascade with fuzzy name matching, and invokes the
//! storefront's add-to-cart flow.
//!
//! The engine stops short of checkout on purpose, and never performs login —
//! it waits (bounded) for the operator or a persistent profile to resolve
//! authentication. The session is deliberately left open after every run,
//! success or failure, for manual review.

pub mod cdp;
pub mod driver;
pub mod engine;
pub mod fuzzy;
pub mod launcher;

pub use cdp::{CdpClient, CdpError, PageSession};
pub use driver::{DriverSelectors, ListingEntry, StoreDriver};
pub use engine::{AutomationEngine, AutomationError, OrderRequest};
pub use launcher::ChromeLauncher;
