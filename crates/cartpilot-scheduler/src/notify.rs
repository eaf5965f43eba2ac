//! Notification dispatch — surfaces a due schedule to the operator.
//! A system-level alert goes through the `Notifier` collaborator; an in-app
//! banner stays visible until dismissed or the run starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::{OrderTemplate, ScheduleDefinition};

/// External notification collaborator (OS alerts, tray, etc).
pub trait Notifier: Send + Sync {
    /// Ask the platform for permission to alert. Idempotent.
    fn request_permission(&self);
    /// Show a system-level alert.
    fn show_alert(&self, title: &str, body: &str, tag: &str);
}

/// Default collaborator: alerts go to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn request_permission(&self) {}

    fn show_alert(&self, title: &str, body: &str, tag: &str) {
        tracing::info!("🔔 [{}] {} — {}", tag, title, body);
    }
}

/// An in-app indicator for a due schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueBanner {
    pub schedule_id: String,
    pub template_name: String,
    pub store_name: String,
    /// "missed" catch-up fires get different wording, nothing else changes.
    pub missed: bool,
    pub shown_at: DateTime<Utc>,
}

/// Routes due-schedule events to the operator.
pub struct NotificationDispatcher {
    notifier: Box<dyn Notifier>,
    banners: Vec<DueBanner>,
    /// Alert history (in-memory ring buffer, max 100).
    history: Vec<DueBanner>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        notifier.request_permission();
        Self {
            notifier,
            banners: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Announce a fired schedule: system alert + in-app banner.
    pub fn announce(
        &mut self,
        schedule: &ScheduleDefinition,
        template: &OrderTemplate,
        missed: bool,
    ) {
        let title = if missed {
            format!("Missed order reminder: {}", template.name)
        } else {
            format!("Order reminder: {}", template.name)
        };
        let body = format!(
            "{} item(s) ready to order from {}",
            template.items.len(),
            template.store_name
        );
        self.notifier.show_alert(&title, &body, &schedule.id);

        let banner = DueBanner {
            schedule_id: schedule.id.clone(),
            template_name: template.name.clone(),
            store_name: template.store_name.clone(),
            missed,
            shown_at: Utc::now(),
        };
        self.banners.retain(|b| b.schedule_id != schedule.id);
        self.banners.push(banner.clone());

        self.history.push(banner);
        // Ring buffer — keep last 100
        if self.history.len() > 100 {
            self.history.remove(0);
        }
    }

    /// Currently visible in-app banners (the due-schedule query for display).
    pub fn due_banners(&self) -> &[DueBanner] {
        &self.banners
    }

    /// Clear the in-app indicator for one schedule. Alert history is kept.
    pub fn dismiss(&mut self, schedule_id: &str) {
        self.banners.retain(|b| b.schedule_id != schedule_id);
    }

    /// Past alerts, oldest first.
    pub fn history(&self) -> &[DueBanner] {
        &self.history
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(Box::new(LogNotifier))
    }
}
