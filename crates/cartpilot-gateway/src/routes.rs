//! API route handlers for the gateway.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use chrono::Utc;
use serde::Deserialize;

use cartpilot_browser::AutomationError;
use cartpilot_browser::engine::OrderRequest;
use cartpilot_core::outcome::{ExecutionOutcome, OutcomeStatus, TriggeredBy};

use super::server::AppState;

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// One-shot order request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBody {
    #[serde(default)]
    pub store_url: String,
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub special_instructions: String,
    #[serde(default)]
    pub options: OrderOptions,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrderOptions {
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub profile_ref: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
}

/// Execute an order synchronously and report the result.
/// Validation problems are 400 and never touch the browser;
/// session-level failures are 500 and still land in the history.
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OrderBody>,
) -> impl IntoResponse {
    if body.store_url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "storeUrl is required" })),
        );
    }

    let mut instructions = body.special_instructions.clone();
    if let Some(address) = &body.options.delivery_address
        && !address.is_empty()
    {
        if !instructions.is_empty() {
            instructions.push_str(" — ");
        }
        instructions.push_str(&format!("Deliver to: {address}"));
    }

    let request = OrderRequest {
        store_url: body.store_url,
        store_name: body.store_name,
        items: body.items,
        special_instructions: instructions,
        headless: body.options.headless.unwrap_or(state.browser_config.headless),
        profile_dir: body.options.profile_ref.map(std::path::PathBuf::from),
        triggered_by: TriggeredBy::Manual,
    };
    let requested = request.items.len();

    match state.automation.execute(request).await {
        Ok(outcome) => {
            record(&state, &outcome);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": outcome.status != OutcomeStatus::Failed,
                    "message": outcome.message,
                    "itemsAdded": outcome.items_fulfilled,
                })),
            )
        }
        Err(AutomationError::Validation(msg)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": msg })),
        ),
        Err(AutomationError::AlreadyRunning) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": AutomationError::AlreadyRunning.to_string(),
            })),
        ),
        Err(e) => {
            // The run started — it still gets its audit row.
            let outcome =
                ExecutionOutcome::session_failure(requested, TriggeredBy::Manual, e.to_string());
            record(&state, &outcome);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Order run failed",
                    "details": e.to_string(),
                })),
            )
        }
    }
}

fn record(state: &AppState, outcome: &ExecutionOutcome) {
    if let Ok(db) = state.history.lock()
        && let Err(e) = db.record(outcome)
    {
        tracing::warn!("⚠️ Failed to record outcome: {e}");
    }
}

/// All schedules plus the currently due in-app banners.
pub async fn list_schedules(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let scheduler = state.scheduler.lock().await;
    Json(serde_json::json!({
        "schedules": scheduler.list_schedules(),
        "due": scheduler.dispatcher.due_banners(),
    }))
}

/// Fire a schedule unconditionally, bypassing the timing check.
pub async fn trigger_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let fired = {
        let mut scheduler = state.scheduler.lock().await;
        scheduler.trigger_now(&id)
    };

    match fired {
        Some(trigger) => {
            if trigger.auto_open {
                let request = state.request_from_trigger(&trigger);
                state.spawn_run(request);
            }
            (
                StatusCode::OK,
                Json(serde_json::json!({ "fired": true, "scheduleId": id })),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Unknown schedule '{id}'") })),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct SnoozeBody {
    pub minutes: i64,
}

/// Suppress refiring of a schedule; its trigger instant is untouched.
pub async fn snooze_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SnoozeBody>,
) -> Json<serde_json::Value> {
    let mut scheduler = state.scheduler.lock().await;
    scheduler.snooze(&id, body.minutes.max(1));
    Json(serde_json::json!({ "snoozed": true, "scheduleId": id, "minutes": body.minutes.max(1) }))
}

/// Recent outcomes, newest first.
pub async fn recent_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let outcomes = match state.history.lock() {
        Ok(db) => db.recent(50),
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "History unavailable" })),
            );
        }
    };
    match outcomes {
        Ok(outcomes) => (StatusCode::OK, Json(serde_json::json!({ "outcomes": outcomes }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_body_accepts_camel_case() {
        let body: OrderBody = serde_json::from_str(
            r#"{
                "storeUrl": "https://shop.example.com",
                "storeName": "Example Shop",
                "items": ["Milk", "Eggs"],
                "specialInstructions": "ring twice",
                "options": {"headless": true, "profileRef": "/tmp/profile"}
            }"#,
        )
        .unwrap();
        assert_eq!(body.store_url, "https://shop.example.com");
        assert_eq!(body.items.len(), 2);
        assert_eq!(body.options.headless, Some(true));
    }

    #[test]
    fn test_order_body_minimal() {
        let body: OrderBody = serde_json::from_str(r#"{"storeUrl": "https://x.dev"}"#).unwrap();
        assert!(body.items.is_empty());
        assert!(body.options.headless.is_none());
    }

    #[test]
    fn test_snooze_body_shape() {
        // The CLI posts this exact body; keep the contract pinned.
        let body: SnoozeBody = serde_json::from_str(r#"{"minutes": 10}"#).unwrap();
        assert_eq!(body.minutes, 10);
    }
}
