//! SQLite-backed outcome history — survives restarts.
//! Exactly one row per automation run, immutable once written.

use std::path::Path;

use cartpilot_core::error::{CartPilotError, Result};
use cartpilot_core::outcome::{ExecutionOutcome, OutcomeStatus, TriggeredBy};
use chrono::{DateTime, Utc};

/// SQLite store for execution outcomes.
pub struct HistoryDb {
    conn: rusqlite::Connection,
}

impl HistoryDb {
    /// Open or create the history database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| CartPilotError::Storage(format!("DB open: {e}")))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| CartPilotError::Storage(format!("DB open: {e}")))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL,            -- 'completed', 'partial', 'failed'
                items_requested INTEGER NOT NULL,
                items_fulfilled INTEGER NOT NULL,
                triggered_by TEXT NOT NULL,      -- 'manual', 'schedule'
                timestamp TEXT NOT NULL,
                message TEXT
            );
            ",
            )
            .map_err(|e| CartPilotError::Storage(format!("Migrate: {e}")))?;
        Ok(())
    }

    /// Record one outcome.
    pub fn record(&self, outcome: &ExecutionOutcome) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO outcomes
                 (status, items_requested, items_fulfilled, triggered_by, timestamp, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    status_str(outcome.status),
                    outcome.items_requested as i64,
                    outcome.items_fulfilled as i64,
                    triggered_by_str(outcome.triggered_by),
                    outcome.timestamp.to_rfc3339(),
                    outcome.message,
                ],
            )
            .map_err(|e| CartPilotError::Storage(format!("Insert outcome: {e}")))?;
        Ok(())
    }

    /// Most recent outcomes, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ExecutionOutcome>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT status, items_requested, items_fulfilled, triggered_by, timestamp, message
                 FROM outcomes ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| CartPilotError::Storage(format!("Query: {e}")))?;

        let rows = stmt
            .query_map([limit as i64], |row| {
                let status: String = row.get(0)?;
                let triggered_by: String = row.get(3)?;
                let timestamp: String = row.get(4)?;
                Ok(ExecutionOutcome {
                    status: parse_status(&status),
                    items_requested: row.get::<_, i64>(1)? as usize,
                    items_fulfilled: row.get::<_, i64>(2)? as usize,
                    triggered_by: parse_triggered_by(&triggered_by),
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    message: row.get(5)?,
                })
            })
            .map_err(|e| CartPilotError::Storage(format!("Query outcomes: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| CartPilotError::Storage(format!("Row: {e}")))?);
        }
        Ok(out)
    }
}

fn status_str(s: OutcomeStatus) -> &'static str {
    match s {
        OutcomeStatus::Completed => "completed",
        OutcomeStatus::Partial => "partial",
        OutcomeStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> OutcomeStatus {
    match s {
        "completed" => OutcomeStatus::Completed,
        "partial" => OutcomeStatus::Partial,
        _ => OutcomeStatus::Failed,
    }
}

fn triggered_by_str(t: TriggeredBy) -> &'static str {
    match t {
        TriggeredBy::Manual => "manual",
        TriggeredBy::Schedule => "schedule",
    }
}

fn parse_triggered_by(s: &str) -> TriggeredBy {
    match s {
        "schedule" => TriggeredBy::Schedule,
        _ => TriggeredBy::Manual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_recent() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.record(&ExecutionOutcome::classify(
            2,
            1,
            TriggeredBy::Schedule,
            Some("1 of 2 added".into()),
        ))
        .unwrap();
        db.record(&ExecutionOutcome::session_failure(
            3,
            TriggeredBy::Manual,
            "Navigation failed".into(),
        ))
        .unwrap();

        let recent = db.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        // Newest first.
        assert_eq!(recent[0].status, OutcomeStatus::Failed);
        assert_eq!(recent[0].triggered_by, TriggeredBy::Manual);
        assert_eq!(recent[1].status, OutcomeStatus::Partial);
        assert_eq!(recent[1].items_fulfilled, 1);
    }
}
