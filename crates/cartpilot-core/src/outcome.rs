//! Execution outcome model — the audit record of one automation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Every requested item landed in the cart (including the
    /// zero-items "navigate only" case).
    Completed,
    /// Some but not all items landed in the cart.
    Partial,
    /// Nothing landed, or the session aborted before item work.
    Failed,
}

/// Who asked for the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Manual,
    Schedule,
}

/// The recorded result of one automation execution. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    pub items_requested: usize,
    pub items_fulfilled: usize,
    pub triggered_by: TriggeredBy,
    pub timestamp: DateTime<Utc>,
    /// Human-readable summary or error message.
    pub message: Option<String>,
}

impl ExecutionOutcome {
    /// Classify a finished item pass.
    /// fulfilled == requested is Completed even at 0/0 (navigate only).
    pub fn classify(
        requested: usize,
        fulfilled: usize,
        triggered_by: TriggeredBy,
        message: Option<String>,
    ) -> Self {
        let status = if fulfilled == requested {
            OutcomeStatus::Completed
        } else if fulfilled > 0 {
            OutcomeStatus::Partial
        } else {
            OutcomeStatus::Failed
        };
        Self {
            status,
            items_requested: requested,
            items_fulfilled: fulfilled,
            triggered_by,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Build the audit row for a run that aborted at session level.
    pub fn session_failure(requested: usize, triggered_by: TriggeredBy, message: String) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            items_requested: requested,
            items_fulfilled: 0,
            triggered_by,
            timestamp: Utc::now(),
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_completed() {
        let o = ExecutionOutcome::classify(2, 2, TriggeredBy::Manual, None);
        assert_eq!(o.status, OutcomeStatus::Completed);
    }

    #[test]
    fn test_classify_navigate_only_is_completed() {
        let o = ExecutionOutcome::classify(0, 0, TriggeredBy::Manual, None);
        assert_eq!(o.status, OutcomeStatus::Completed);
        assert_eq!(o.items_fulfilled, 0);
    }

    #[test]
    fn test_classify_partial() {
        let o = ExecutionOutcome::classify(3, 1, TriggeredBy::Schedule, None);
        assert_eq!(o.status, OutcomeStatus::Partial);
    }

    #[test]
    fn test_classify_failed() {
        let o = ExecutionOutcome::classify(2, 0, TriggeredBy::Manual, None);
        assert_eq!(o.status, OutcomeStatus::Failed);
    }
}
