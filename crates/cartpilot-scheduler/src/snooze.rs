//! Snooze registry — transient suppression of refiring per schedule.
//! Process-lifetime, in-memory only. A restart clears all snoozes by design.
//! Snoozing never touches the schedule's own timing fields.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// schedule_id → resume-at timestamp.
#[derive(Debug, Default)]
pub struct SnoozeRegistry {
    entries: HashMap<String, DateTime<Utc>>,
}

impl SnoozeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress refiring of a schedule until `minutes` from now.
    pub fn snooze(&mut self, schedule_id: &str, minutes: i64) {
        let resume_at = Utc::now() + Duration::minutes(minutes);
        tracing::info!("😴 Snoozed '{}' until {}", schedule_id, resume_at);
        self.entries.insert(schedule_id.to_string(), resume_at);
    }

    /// Is the schedule currently suppressed?
    /// Elapsed entries are lazily dropped.
    pub fn is_snoozed(&mut self, schedule_id: &str, now: DateTime<Utc>) -> bool {
        match self.entries.get(schedule_id) {
            Some(resume_at) if *resume_at > now => true,
            Some(_) => {
                self.entries.remove(schedule_id);
                false
            }
            None => false,
        }
    }

    /// Clear any entry for the schedule (called on fire).
    pub fn clear(&mut self, schedule_id: &str) {
        self.entries.remove(schedule_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
