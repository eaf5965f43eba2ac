//! File-based schedule/template store — lightweight persistence.
//! Saved as pretty JSON — human-readable, git-friendly.
//! Single-writer, read-all/modify/write-all per mutation.

use std::path::{Path, PathBuf};

use cartpilot_core::error::{CartPilotError, Result};

use crate::schedule::{OrderTemplate, ScheduleDefinition};

/// File-based store for schedules and order templates.
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    /// Create a store at the given directory.
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            path: dir.to_path_buf(),
        }
    }

    /// Default store path (~/.cartpilot/store).
    pub fn default_path() -> PathBuf {
        cartpilot_core::CartPilotConfig::home_dir().join("store")
    }

    /// Save all schedules to disk.
    pub fn save_schedules(&self, schedules: &[ScheduleDefinition]) -> Result<()> {
        self.write_json("schedules.json", schedules)
    }

    /// Load all schedules from disk.
    pub fn load_schedules(&self) -> Vec<ScheduleDefinition> {
        self.read_json("schedules.json")
    }

    /// Save all templates to disk.
    pub fn save_templates(&self, templates: &[OrderTemplate]) -> Result<()> {
        self.write_json("templates.json", templates)
    }

    /// Load all templates from disk.
    pub fn load_templates(&self) -> Vec<OrderTemplate> {
        self.read_json("templates.json")
    }

    /// Look up a template by id.
    pub fn template_by_id(&self, id: &str) -> Option<OrderTemplate> {
        self.load_templates().into_iter().find(|t| t.id == id)
    }

    fn write_json<T: serde::Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let file = self.path.join(name);
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| CartPilotError::Storage(format!("Serialize {name}: {e}")))?;
        std::fs::write(&file, &json)
            .map_err(|e| CartPilotError::Storage(format!("Write {name}: {e}")))?;
        tracing::debug!("💾 Saved {}", file.display());
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Vec<T> {
        let file = self.path.join(name);
        if !file.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&file) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {name}: {e}");
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {name}: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::schedule::ScheduleDefinition;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join("cartpilot-test-store");
        let store = ScheduleStore::new(&dir);

        let tmpl = OrderTemplate::new(
            "Weekly groceries",
            "https://shop.example.com",
            "Example Shop",
            vec!["Milk".into(), "Eggs".into()],
        );
        let sched = ScheduleDefinition::once(&tmpl.id, Utc::now() + Duration::hours(2), 10);

        store.save_templates(std::slice::from_ref(&tmpl)).unwrap();
        store.save_schedules(std::slice::from_ref(&sched)).unwrap();

        let schedules = store.load_schedules();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].id, sched.id);
        assert_eq!(store.template_by_id(&tmpl.id).unwrap().items.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = std::env::temp_dir().join("cartpilot-test-store-empty");
        let store = ScheduleStore::new(&dir);
        assert!(store.load_schedules().is_empty());
        assert!(store.load_templates().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
