/**
 * HTTP API - read-only window on the dashboard
 *
 * ROLE :
 * Serves the view published by the presentation cycle and forwards the two
 * mutating requests (clear history, export CSV) to it as ControlCommands.
 * Handlers never touch DashboardState directly.
 *
 * ROUTES :
 * - GET  /health         process counters
 * - GET  /status         current DashboardView (JSON)
 * - GET  /history        buffered readings, oldest first
 * - GET  /export.csv     history as a CSV download
 * - POST /history/clear  queue a ClearHistory for the next cycle (202)
 * - POST /export         write the CSV on the server, reply with its path
 */

use crate::cycle::{ControlCommand, CycleHandles};
use crate::envelope::SensorReading;
use crate::export::{export_filename, to_csv_string};
use crate::health::{HealthTracker, MonitorHealth};
use crate::view::DashboardView;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub views: watch::Receiver<Arc<DashboardView>>,
    pub commands: tokio::sync::mpsc::Sender<ControlCommand>,
    pub health: HealthTracker,
}

impl AppState {
    pub fn new(handles: CycleHandles, health: HealthTracker) -> Self {
        Self {
            views: handles.views,
            commands: handles.commands,
            health,
        }
    }

    fn current(&self) -> Arc<DashboardView> {
        self.views.borrow().clone()
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/status", get(get_status))
        .route("/history", get(get_history))
        .route("/export.csv", get(download_csv))
        .route("/history/clear", post(clear_history))
        .route("/export", post(export_csv))
        .with_state(app_state)
}

// GET /health
async fn get_health(State(app): State<AppState>) -> Json<MonitorHealth> {
    let view = app.current();
    Json(app.health.get_health(view.connected, view.total_readings, view.cycle))
}

// GET /status
async fn get_status(State(app): State<AppState>) -> Json<Arc<DashboardView>> {
    Json(app.current())
}

// GET /history
async fn get_history(State(app): State<AppState>) -> Json<Vec<SensorReading>> {
    Json(app.current().history.clone())
}

// GET /export.csv
async fn download_csv(State(app): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let view = app.current();
    let (body, filename) = to_csv_string(view.history.iter())
        .and_then(|body| Ok((body, export_filename(view.generated_at)?)))
        .map_err(|e| {
            error!("CSV download failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
    ];
    Ok((headers, body))
}

// POST /history/clear
async fn clear_history(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match app.commands.send(ControlCommand::ClearHistory).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(serde_json::json!({ "ok": true, "status": "queued" }))),
        Err(_) => {
            warn!("clear requested but the presentation cycle is gone");
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "ok": false })))
        }
    }
}

// POST /export
async fn export_csv(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let (reply, response) = oneshot::channel();
    if app.commands.send(ControlCommand::ExportCsv { reply }).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "ok": false })));
    }
    match response.await {
        Ok(Ok(path)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "path": path.display().to_string() })),
        ),
        Ok(Err(msg)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "ok": false, "error": msg })),
        ),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "ok": false }))),
    }
}
