//! Scheduler engine — the poll loop that detects due schedules and fires them.
//! Uses tokio::interval for zero-overhead ticking; the first tick runs
//! immediately at startup. Missed-trigger recovery and the poller share one
//! engine value behind one lock, so the at-most-once firing guard
//! (`last_triggered_at < next_trigger_at`) holds across both paths.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use tokio::sync::Mutex;

use cartpilot_core::config::SchedulerConfig;
use cartpilot_core::outcome::ExecutionOutcome;

use crate::history::HistoryDb;
use crate::notify::NotificationDispatcher;
use crate::schedule::{OrderTemplate, ScheduleDefinition, ScheduleTiming};
use crate::snooze::SnoozeRegistry;
use crate::store::ScheduleStore;
use crate::timing;

/// A schedule that just fired, handed to the run loop for execution.
#[derive(Debug, Clone)]
pub struct FiredTrigger {
    pub schedule_id: String,
    pub template: OrderTemplate,
    pub auto_open: bool,
    pub missed: bool,
}

/// The trigger engine — owns the schedules, the snooze registry, and the
/// notification dispatcher. Poll handle state lives here, never in globals.
pub struct SchedulerEngine {
    schedules: Vec<ScheduleDefinition>,
    store: ScheduleStore,
    pub snoozes: SnoozeRegistry,
    pub dispatcher: NotificationDispatcher,
    poll_window: Duration,
    recovery_window: Duration,
}

impl SchedulerEngine {
    /// Create an engine over the given store directory.
    pub fn new(store_dir: &Path, config: &SchedulerConfig) -> Self {
        let store = ScheduleStore::new(store_dir);
        let schedules = store.load_schedules();
        let mut engine = Self {
            schedules,
            store,
            snoozes: SnoozeRegistry::new(),
            dispatcher: NotificationDispatcher::default(),
            poll_window: Duration::seconds(config.poll_window_secs as i64),
            recovery_window: Duration::seconds(config.recovery_window_secs as i64),
        };
        engine.recompute_trigger_times(Utc::now());
        engine
    }

    /// Create with the default store path.
    pub fn with_defaults(config: &SchedulerConfig) -> Self {
        Self::new(&ScheduleStore::default_path(), config)
    }

    /// Add a schedule. Computes its first trigger instant if unset.
    pub fn add_schedule(&mut self, mut schedule: ScheduleDefinition) {
        if schedule.next_trigger_at.is_none() && schedule.enabled {
            schedule.next_trigger_at = timing::next_trigger_at(
                &schedule.timing,
                schedule.reminder_offset_mins,
                &Local::now(),
            );
        }
        tracing::info!(
            "📅 Schedule added: '{}' (next: {:?})",
            schedule.id,
            schedule.next_trigger_at
        );
        self.schedules.push(schedule);
        self.save();
    }

    /// Remove a schedule by ID.
    pub fn remove_schedule(&mut self, id: &str) -> bool {
        let len = self.schedules.len();
        self.schedules.retain(|s| s.id != id);
        if self.schedules.len() < len {
            self.snoozes.clear(id);
            self.save();
            true
        } else {
            false
        }
    }

    /// List all schedules.
    pub fn list_schedules(&self) -> &[ScheduleDefinition] {
        &self.schedules
    }

    /// Enable/disable a schedule. Enabling recomputes the trigger instant.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) {
        if let Some(s) = self.schedules.iter_mut().find(|s| s.id == id) {
            s.enabled = enabled;
            s.next_trigger_at = if enabled {
                timing::next_trigger_at(&s.timing, s.reminder_offset_mins, &Local::now())
            } else {
                None
            };
            self.save();
        }
    }

    /// Add an order template.
    pub fn add_template(&mut self, template: OrderTemplate) {
        let mut templates = self.store.load_templates();
        templates.push(template);
        if let Err(e) = self.store.save_templates(&templates) {
            tracing::warn!("⚠️ Failed to save templates: {e}");
        }
    }

    /// List templates.
    pub fn list_templates(&self) -> Vec<OrderTemplate> {
        self.store.load_templates()
    }

    /// Snooze a schedule for `minutes`. Does not alter its trigger instant.
    pub fn snooze(&mut self, schedule_id: &str, minutes: i64) {
        self.snoozes.snooze(schedule_id, minutes);
        self.dispatcher.dismiss(schedule_id);
    }

    /// Tick — check and fire due schedules. Called periodically.
    pub fn tick(&mut self) -> Vec<FiredTrigger> {
        self.scan(Utc::now(), self.poll_window, false)
    }

    /// Tick against an explicit clock (tests freeze `now` through this).
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Vec<FiredTrigger> {
        self.scan(now, self.poll_window, false)
    }

    /// Catch-up scan for triggers missed while the host was away.
    /// Misses older than the recovery window are dropped silently.
    pub fn recover_missed(&mut self) -> Vec<FiredTrigger> {
        self.scan(Utc::now(), self.recovery_window, true)
    }

    /// Catch-up scan against an explicit clock.
    pub fn recover_missed_at(&mut self, now: DateTime<Utc>) -> Vec<FiredTrigger> {
        self.scan(now, self.recovery_window, true)
    }

    /// Fire a schedule unconditionally, bypassing the timing check.
    pub fn trigger_now(&mut self, schedule_id: &str) -> Option<FiredTrigger> {
        let now = Utc::now();
        let idx = self.schedules.iter().position(|s| s.id == schedule_id)?;
        let fired = self.fire(idx, now, false);
        self.save();
        fired
    }

    fn scan(&mut self, now: DateTime<Utc>, window: Duration, missed: bool) -> Vec<FiredTrigger> {
        let mut fired = Vec::new();
        for idx in 0..self.schedules.len() {
            if !self.is_due(idx, now, window) {
                continue;
            }
            if let Some(trigger) = self.fire(idx, now, missed) {
                fired.push(trigger);
            }
        }
        if !fired.is_empty() {
            self.save();
        }
        fired
    }

    /// Due iff the trigger instant has arrived within the window and has not
    /// already fired for that instant, and the schedule is not snoozed.
    fn is_due(&mut self, idx: usize, now: DateTime<Utc>, window: Duration) -> bool {
        let s = &self.schedules[idx];
        if !s.enabled {
            return false;
        }
        let Some(next) = s.next_trigger_at else {
            return false;
        };
        if next > now || next <= now - window {
            return false;
        }
        // At-most-once per trigger instant, even across overlapping scans.
        if let Some(last) = s.last_triggered_at
            && last >= next
        {
            return false;
        }
        let id = s.id.clone();
        !self.snoozes.is_snoozed(&id, now)
    }

    /// The single firing path used by the poller, recovery, and trigger_now.
    fn fire(&mut self, idx: usize, now: DateTime<Utc>, missed: bool) -> Option<FiredTrigger> {
        let (id, template_id) = {
            let s = &self.schedules[idx];
            (s.id.clone(), s.template_id.clone())
        };
        self.snoozes.clear(&id);

        let template = self.store.template_by_id(&template_id);

        {
            let s = &mut self.schedules[idx];
            // Consume the trigger instant whether or not the template still
            // exists, so an orphaned schedule cannot refire every tick.
            // A manual fire ahead of the instant records `now` instead, which
            // keeps last_triggered_at below any recomputed instant.
            s.last_triggered_at = match s.next_trigger_at {
                Some(next) if next <= now => Some(next),
                _ => Some(now),
            };
            match &s.timing {
                ScheduleTiming::Once { .. } => {
                    s.enabled = false;
                    s.next_trigger_at = None;
                }
                ScheduleTiming::Recurring { .. } => {
                    s.next_trigger_at = timing::next_trigger_at(
                        &s.timing,
                        s.reminder_offset_mins,
                        &now.with_timezone(&Local),
                    );
                }
            }
        }

        let Some(template) = template else {
            tracing::warn!("⚠️ Schedule '{}' references missing template '{}'", id, template_id);
            return None;
        };

        tracing::info!(
            "🔔 Schedule triggered{}: '{}' → '{}'",
            if missed { " (missed)" } else { "" },
            id,
            template.name
        );

        let s = &self.schedules[idx];
        self.dispatcher.announce(s, &template, missed);

        Some(FiredTrigger {
            schedule_id: id,
            auto_open: s.auto_open,
            template,
            missed,
        })
    }

    /// Compute trigger instants for schedules that lack one, and refresh
    /// instants that were already consumed before a restart. A past instant
    /// that has NOT fired is left alone — that is recovery's job.
    fn recompute_trigger_times(&mut self, now: DateTime<Utc>) {
        for s in self.schedules.iter_mut() {
            if !s.enabled {
                continue;
            }
            let consumed = match (s.next_trigger_at, s.last_triggered_at) {
                (Some(next), Some(last)) => next < now && last >= next,
                _ => false,
            };
            if s.next_trigger_at.is_none() || consumed {
                if matches!(s.timing, ScheduleTiming::Once { .. }) && consumed {
                    s.enabled = false;
                    s.next_trigger_at = None;
                } else {
                    s.next_trigger_at = timing::next_trigger_at(
                        &s.timing,
                        s.reminder_offset_mins,
                        &now.with_timezone(&Local),
                    );
                }
            }
        }
    }

    fn save(&self) {
        if let Err(e) = self.store.save_schedules(&self.schedules) {
            tracing::warn!("⚠️ Failed to save schedules: {e}");
        }
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.len()
    }
}

/// Spawn the poll loop as a background tokio task.
///
/// Fired triggers with `auto_open` are handed to `run_order` as detached
/// tasks — the loop never awaits a browser run. The callback decides the
/// audit row: `Some(outcome)` is recorded (a failed run maps to a Failed
/// outcome there, not dropped), `None` means the run never started (e.g.
/// rejected because another one was in flight) and nothing is recorded.
pub async fn spawn_scheduler_with_automation<F, Fut>(
    engine: Arc<Mutex<SchedulerEngine>>,
    history: Arc<std::sync::Mutex<HistoryDb>>,
    run_order: F,
    poll_interval_secs: u64,
) where
    F: Fn(FiredTrigger) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Option<ExecutionOutcome>> + Send + 'static,
{
    tracing::info!("⏰ Scheduler started (check every {}s)", poll_interval_secs);

    let run_order = Arc::new(run_order);
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(poll_interval_secs.max(1)));

    loop {
        // First tick completes immediately — the startup scan.
        interval.tick().await;

        let fired = {
            let mut eng = engine.lock().await;
            eng.tick()
        };

        for trigger in fired {
            if !trigger.auto_open {
                continue;
            }
            let run_order = run_order.clone();
            let history = history.clone();
            tokio::spawn(async move {
                let Some(outcome) = run_order(trigger).await else {
                    return;
                };
                if let Ok(db) = history.lock()
                    && let Err(e) = db.record(&outcome)
                {
                    tracing::warn!("⚠️ Failed to record outcome: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use chrono::Weekday;

    fn test_engine(name: &str, window_secs: u64) -> (SchedulerEngine, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("cartpilot-test-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        let config = SchedulerConfig {
            poll_interval_secs: 30,
            poll_window_secs: window_secs,
            recovery_window_secs: 300,
        };
        (SchedulerEngine::new(&dir, &config), dir)
    }

    fn seed_template(engine: &mut SchedulerEngine) -> OrderTemplate {
        let tmpl = OrderTemplate::new(
            "Weekly groceries",
            "https://shop.example.com",
            "Example Shop",
            vec!["Milk".into()],
        );
        engine.add_template(tmpl.clone());
        tmpl
    }

    #[test]
    fn test_due_then_fired_once() {
        let (mut engine, dir) = test_engine("due-once", 30);
        let tmpl = seed_template(&mut engine);
        let now = Utc::now();

        let mut sched = ScheduleDefinition::once(&tmpl.id, now + Duration::hours(1), 0);
        sched.next_trigger_at = Some(now - Duration::seconds(5));
        engine.add_schedule(sched);

        let fired = engine.tick_at(now);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].template.id, tmpl.id);

        // last_triggered_at now equals the consumed instant — no refire.
        assert!(engine.tick_at(now).is_empty());

        // Once schedules disable themselves and null their trigger instant.
        let s = &engine.list_schedules()[0];
        assert!(!s.enabled);
        assert!(s.next_trigger_at.is_none());
        assert_eq!(s.last_triggered_at, Some(now - Duration::seconds(5)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_outside_poll_window_not_due() {
        let (mut engine, dir) = test_engine("window", 30);
        let tmpl = seed_template(&mut engine);
        let now = Utc::now();

        let mut sched = ScheduleDefinition::once(&tmpl.id, now + Duration::hours(1), 0);
        sched.next_trigger_at = Some(now - Duration::seconds(90));
        engine.add_schedule(sched);

        // 90s old with a 30s window: the poller skips it...
        assert!(engine.tick_at(now).is_empty());
        // ...but the 5-minute recovery scan picks it up, worded as missed.
        let recovered = engine.recover_missed_at(now);
        assert_eq!(recovered.len(), 1);
        assert!(recovered[0].missed);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_recovery_window_cutoff() {
        let (mut engine, dir) = test_engine("recovery-cutoff", 30);
        let tmpl = seed_template(&mut engine);
        let now = Utc::now();

        let mut sched = ScheduleDefinition::once(&tmpl.id, now + Duration::hours(1), 0);
        sched.next_trigger_at = Some(now - Duration::minutes(10));
        engine.add_schedule(sched);

        // Ten minutes old — beyond the 5-minute recovery window, dropped.
        assert!(engine.recover_missed_at(now).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_snooze_suppresses_refiring() {
        // Wide poll window so the instant stays timestamp-due throughout.
        let (mut engine, dir) = test_engine("snooze", 3600);
        let tmpl = seed_template(&mut engine);
        let now = Utc::now();

        let mut sched = ScheduleDefinition::once(&tmpl.id, now + Duration::hours(1), 0);
        sched.next_trigger_at = Some(now - Duration::seconds(5));
        // Simulate "already announced, operator hit snooze": last unset.
        let id = sched.id.clone();
        engine.add_schedule(sched);
        engine.snooze(&id, 5);

        // Still timestamp-due, but suppressed.
        assert!(engine.tick_at(now).is_empty());

        // Once the snooze elapses it fires; next_trigger_at was never touched.
        let fired = engine.tick_at(now + Duration::minutes(6));
        assert_eq!(fired.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_recurring_recomputes_strictly_later() {
        let (mut engine, dir) = test_engine("recurring", 30);
        let tmpl = seed_template(&mut engine);
        let now = Utc::now();

        let mut sched = ScheduleDefinition::recurring(
            &tmpl.id,
            vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            0,
        );
        sched.next_trigger_at = Some(now - Duration::seconds(5));
        engine.add_schedule(sched);

        let fired = engine.tick_at(now);
        assert_eq!(fired.len(), 1);

        let s = &engine.list_schedules()[0];
        assert!(s.enabled);
        let next = s.next_trigger_at.expect("recurring must recompute");
        assert!(next > s.last_triggered_at.unwrap());
        assert!(next > now);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_trigger_now_bypasses_timing() {
        let (mut engine, dir) = test_engine("trigger-now", 30);
        let tmpl = seed_template(&mut engine);

        // Next trigger is an hour away — not due at all.
        let sched = ScheduleDefinition::once(&tmpl.id, Utc::now() + Duration::hours(1), 0);
        let id = sched.id.clone();
        engine.add_schedule(sched);

        assert!(engine.tick().is_empty());
        let fired = engine.trigger_now(&id);
        assert!(fired.is_some());
        assert_eq!(fired.unwrap().template.id, tmpl.id);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_disabled_schedule_never_due() {
        let (mut engine, dir) = test_engine("disabled", 30);
        let tmpl = seed_template(&mut engine);
        let now = Utc::now();

        let mut sched = ScheduleDefinition::once(&tmpl.id, now + Duration::hours(1), 0);
        sched.next_trigger_at = Some(now - Duration::seconds(5));
        sched.enabled = false;
        engine.add_schedule(sched);

        assert!(engine.tick_at(now).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    /// Engine with one due auto_open schedule, wired for the poll loop.
    fn due_auto_open_engine(name: &str) -> (Arc<Mutex<SchedulerEngine>>, std::path::PathBuf) {
        let (mut engine, dir) = test_engine(name, 3600);
        let tmpl = seed_template(&mut engine);
        let mut sched = ScheduleDefinition::once(&tmpl.id, Utc::now() + Duration::hours(1), 0);
        sched.auto_open = true;
        sched.next_trigger_at = Some(Utc::now() - Duration::seconds(5));
        engine.add_schedule(sched);
        (Arc::new(Mutex::new(engine)), dir)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_records_failed_run_outcome() {
        let (engine, dir) = due_auto_open_engine("loop-records");
        let history = Arc::new(std::sync::Mutex::new(HistoryDb::open_in_memory().unwrap()));

        let loop_task = tokio::spawn(spawn_scheduler_with_automation(
            engine,
            history.clone(),
            |trigger: FiredTrigger| async move {
                Some(ExecutionOutcome::session_failure(
                    trigger.template.items.len(),
                    cartpilot_core::outcome::TriggeredBy::Schedule,
                    "Chrome went away".into(),
                ))
            },
            30,
        ));
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        loop_task.abort();

        let recent = history.lock().unwrap().recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].items_requested, 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_skipped_run_records_nothing() {
        // A run the callback declined to start (another one in flight) must
        // leave no trace in the history.
        let (engine, dir) = due_auto_open_engine("loop-skip");
        let history = Arc::new(std::sync::Mutex::new(HistoryDb::open_in_memory().unwrap()));

        let loop_task = tokio::spawn(spawn_scheduler_with_automation(
            engine,
            history.clone(),
            |_trigger: FiredTrigger| async { None::<ExecutionOutcome> },
            30,
        ));
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        loop_task.abort();

        assert!(history.lock().unwrap().recent(10).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
