//! # CartPilot Gateway
//!
//! HTTP surface for driving UIs: health probe, one-shot order execution,
//! and schedule operations (list/trigger/snooze) plus outcome history.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, serve};
