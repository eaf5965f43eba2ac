//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cartpilot_browser::AutomationEngine;
use cartpilot_browser::engine::OrderRequest;
use cartpilot_core::config::{BrowserConfig, GatewayConfig};
use cartpilot_core::outcome::{ExecutionOutcome, TriggeredBy};
use cartpilot_scheduler::{FiredTrigger, HistoryDb, SchedulerEngine};

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    pub browser_config: BrowserConfig,
    /// Trigger engine — schedules, snoozes, notification banners.
    pub scheduler: Arc<tokio::sync::Mutex<SchedulerEngine>>,
    /// Automation engine — one order run at a time, process-wide.
    pub automation: Arc<AutomationEngine>,
    /// Outcome history — one row per run.
    pub history: Arc<std::sync::Mutex<HistoryDb>>,
}

impl AppState {
    /// Build the order request a fired schedule resolves to.
    pub fn request_from_trigger(&self, trigger: &FiredTrigger) -> OrderRequest {
        OrderRequest {
            store_url: trigger.template.store_url.clone(),
            store_name: trigger.template.store_name.clone(),
            items: trigger.template.items.clone(),
            special_instructions: trigger.template.special_instructions.clone(),
            headless: self.browser_config.headless,
            profile_dir: None,
            triggered_by: TriggeredBy::Schedule,
        }
    }

    /// Run an order as a detached task; the outcome (or a Failed audit row
    /// for a session-level abort) always reaches the history.
    pub fn spawn_run(&self, request: OrderRequest) {
        let automation = self.automation.clone();
        let history = self.history.clone();
        tokio::spawn(async move {
            let requested = request.items.len();
            let triggered_by = request.triggered_by;
            let outcome = match automation.execute(request).await {
                Ok(outcome) => outcome,
                Err(cartpilot_browser::AutomationError::AlreadyRunning) => {
                    tracing::warn!("⚠️ Skipping run — another one is in flight");
                    return;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Order run aborted: {}", e);
                    ExecutionOutcome::session_failure(requested, triggered_by, e.to_string())
                }
            };
            if let Ok(db) = history.lock()
                && let Err(e) = db.record(&outcome)
            {
                tracing::warn!("⚠️ Failed to record outcome: {e}");
            }
        });
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/order", post(super::routes::place_order))
        .route("/api/v1/schedules", get(super::routes::list_schedules))
        .route(
            "/api/v1/schedules/{id}/trigger",
            post(super::routes::trigger_schedule),
        )
        .route(
            "/api/v1/schedules/{id}/snooze",
            post(super::routes::snooze_schedule),
        )
        .route("/api/v1/history", get(super::routes::recent_history))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(shared)
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = format!(
        "{}:{}",
        state.gateway_config.host, state.gateway_config.port
    );
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Gateway listening on http://{}", addr);
    axum::serve(listener, router).await
}
