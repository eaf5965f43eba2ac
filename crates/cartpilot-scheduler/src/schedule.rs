//! Schedule and order template definitions — the core data model.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted rule producing at most one future trigger instant at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    /// Unique schedule ID.
    pub id: String,
    /// The order template this schedule fires.
    pub template_id: String,
    /// When/how to trigger.
    pub timing: ScheduleTiming,
    /// Reminder lead time in minutes, subtracted from the nominal time.
    pub reminder_offset_mins: i64,
    /// Whether the schedule is live.
    pub enabled: bool,
    /// Start the order run immediately on fire, without waiting for the user.
    pub auto_open: bool,
    /// Last fired trigger instant. Monotonically non-decreasing.
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Next computed trigger instant. Strictly future when set, or None.
    pub next_trigger_at: Option<DateTime<Utc>>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

/// How/when the schedule triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScheduleTiming {
    /// Fire once at a specific instant.
    Once { at: DateTime<Utc> },
    /// Fire on selected weekdays at a wall-clock time of day.
    Recurring {
        weekdays: Vec<Weekday>,
        time: NaiveTime,
    },
}

impl ScheduleDefinition {
    /// Create a one-shot schedule.
    pub fn once(template_id: &str, at: DateTime<Utc>, offset_mins: i64) -> Self {
        Self {
            id: format!("sched-{}", Uuid::new_v4()),
            template_id: template_id.to_string(),
            timing: ScheduleTiming::Once { at },
            reminder_offset_mins: offset_mins,
            enabled: true,
            auto_open: false,
            last_triggered_at: None,
            next_trigger_at: None,
            created_at: Utc::now(),
        }
    }

    /// Create a weekly recurring schedule.
    pub fn recurring(
        template_id: &str,
        weekdays: Vec<Weekday>,
        time: NaiveTime,
        offset_mins: i64,
    ) -> Self {
        Self {
            id: format!("sched-{}", Uuid::new_v4()),
            template_id: template_id.to_string(),
            timing: ScheduleTiming::Recurring { weekdays, time },
            reminder_offset_mins: offset_mins,
            enabled: true,
            auto_open: false,
            last_triggered_at: None,
            next_trigger_at: None,
            created_at: Utc::now(),
        }
    }
}

/// A saved order: where to shop and what to put in the cart.
/// Read-only from the trigger engine's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTemplate {
    pub id: String,
    /// Human-readable name ("Weekly groceries").
    pub name: String,
    /// Storefront URL.
    pub store_url: String,
    /// Storefront display name.
    pub store_name: String,
    /// Item names, in the order they should be added.
    pub items: Vec<String>,
    /// Free-text instructions shown alongside the order.
    pub special_instructions: String,
    pub created_at: DateTime<Utc>,
}

impl OrderTemplate {
    pub fn new(name: &str, store_url: &str, store_name: &str, items: Vec<String>) -> Self {
        Self {
            id: format!("tmpl-{}", Uuid::new_v4()),
            name: name.to_string(),
            store_url: store_url.to_string(),
            store_name: store_name.to_string(),
            items,
            special_instructions: String::new(),
            created_at: Utc::now(),
        }
    }
}
