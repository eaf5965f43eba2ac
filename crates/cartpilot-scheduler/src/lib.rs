//! # CartPilot Scheduler
//!
//! The trigger engine: decides *when* an order run should happen and fires it.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval, default 30s + one tick at startup)
//!   ├── due check: next_trigger_at ≤ now, within poll window,
//!   │              last_triggered_at < next_trigger_at, not snoozed
//!   ├── on fire → NotificationDispatcher (alert + in-app banner)
//!   │          → automation callback (detached task) when auto_open
//!   └── recover_missed: same path for triggers missed while the host
//!       was away, bounded by the recovery window
//!
//! History (SQLite) records exactly one ExecutionOutcome per run.
//! Snoozes live in memory only — a restart clears them by design.
//! ```

pub mod engine;
pub mod history;
pub mod notify;
pub mod schedule;
pub mod snooze;
pub mod store;
pub mod timing;

pub use engine::{FiredTrigger, SchedulerEngine, spawn_scheduler_with_automation};
pub use history::HistoryDb;
pub use notify::{DueBanner, LogNotifier, NotificationDispatcher, Notifier};
pub use schedule::{OrderTemplate, ScheduleDefinition, ScheduleTiming};
pub use snooze::SnoozeRegistry;
pub use store::ScheduleStore;
