//! Chrome DevTools Protocol plumbing: websocket client and page session.

pub mod client;
pub mod error;
pub mod session;

pub use client::CdpClient;
pub use error::CdpError;
pub use session::PageSession;
