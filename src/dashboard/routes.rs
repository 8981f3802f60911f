//! Status API route handlers.
//!
//! All endpoints return JSON. Token data comes from the last snapshot the
//! store managed to persist, so a reader never sees a half-applied cycle.

use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::storage::StateStore;
use crate::types::Registry;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub store: Arc<StateStore>,
    /// Set while the scheduler loop is running.
    pub running: Arc<AtomicBool>,
    pub config: ConfigView,
}

impl DashboardState {
    pub fn new(store: Arc<StateStore>, running: Arc<AtomicBool>, config: ConfigView) -> Self {
        Self {
            store,
            running,
            config,
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub tokens: Registry,
}

/// Read-only view of the tunables, as served by `/api/config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigView {
    pub sell_delay_secs: u64,
    pub take_profit_sol: Decimal,
    pub slippage_percent: Decimal,
    pub poll_interval_secs: u64,
    pub max_sell_retries: u32,
    pub state_file: String,
    pub dry_run: bool,
}

impl From<&AppConfig> for ConfigView {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            sell_delay_secs: cfg.strategy.sell_delay_secs,
            take_profit_sol: cfg.strategy.take_profit_sol,
            slippage_percent: cfg.strategy.slippage_percent,
            poll_interval_secs: cfg.strategy.poll_interval_secs,
            max_sell_retries: cfg.strategy.max_sell_retries,
            state_file: cfg.storage.state_file.clone(),
            dry_run: cfg.execution.dry_run,
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: state.running.load(Ordering::SeqCst),
        tokens: state.store.persisted().await,
    })
}

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigView> {
    Json(state.config.clone())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
