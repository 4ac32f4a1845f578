//! Dashboard API route handlers.
//!
//! All endpoints return JSON and are read-only: the dashboard observes
//! the engine, it never drives it. State is shared via `Arc<DashboardState>`.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::service::{ActiveRoundView, GameService};
use crate::engine::settlement::SettlementReport;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub service: Arc<GameService>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(service: Arc<GameService>) -> Self {
        Self {
            service,
            started_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub active_rounds: usize,
    pub settlements_recorded: usize,
    pub uptime_secs: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let active = state.service.active_rounds().await.len();
    let settlements = state.service.recent_settlements().await.len();
    Json(StatusResponse {
        active_rounds: active,
        settlements_recorded: settlements,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

pub async fn get_rounds(State(state): State<AppState>) -> Json<Vec<ActiveRoundView>> {
    Json(state.service.active_rounds().await)
}

pub async fn get_settlements(State(state): State<AppState>) -> Json<Vec<SettlementReport>> {
    Json(state.service.recent_settlements().await)
}
