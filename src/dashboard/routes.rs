//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.
//! Handlers only read the published output table — the dashboard can
//! never mutate orchestrator state.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::{CycleReport, Output};

/// Cycle reports retained for /api/cycles.
const CYCLE_LOG_CAP: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    /// Published output table, shared with the orchestrator.
    pub outputs: Arc<RwLock<HashMap<String, Output>>>,
    pub running: Arc<AtomicBool>,
    pub source_name: String,
    pub started_at: DateTime<Utc>,
    cycle_log: RwLock<Vec<CycleReport>>,
}

impl DashboardState {
    pub fn new(
        outputs: Arc<RwLock<HashMap<String, Output>>>,
        running: Arc<AtomicBool>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            outputs,
            running,
            source_name: source_name.into(),
            started_at: Utc::now(),
            cycle_log: RwLock::new(Vec::new()),
        }
    }

    /// Record a completed cycle. Wired as an orchestrator subscriber.
    pub fn record_cycle(&self, report: &CycleReport) {
        let mut log = self.cycle_log.write().unwrap();
        log.push(report.clone());
        if log.len() > CYCLE_LOG_CAP {
            let excess = log.len() - CYCLE_LOG_CAP;
            log.drain(..excess);
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
    pub source: String,
    pub engines: usize,
    pub degraded_engines: usize,
    pub last_cycle: Option<u64>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertEntry {
    pub engine_id: String,
    pub severity: String,
    pub message: String,
    pub confidence: f64,
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/outputs
pub async fn get_outputs(State(state): State<AppState>) -> Json<HashMap<String, Output>> {
    Json(state.outputs.read().unwrap().clone())
}

/// GET /api/outputs/:id
pub async fn get_output(
    State(state): State<AppState>,
    Path(engine_id): Path<String>,
) -> Result<Json<Output>, StatusCode> {
    state
        .outputs
        .read()
        .unwrap()
        .get(&engine_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/alerts — alerts across all current outputs, newest first.
pub async fn get_alerts(State(state): State<AppState>) -> Json<Vec<AlertEntry>> {
    let outputs = state.outputs.read().unwrap();
    let mut alerts: Vec<AlertEntry> = outputs
        .values()
        .flat_map(|output| {
            output.alerts.iter().map(|alert| AlertEntry {
                engine_id: output.engine_id.clone(),
                severity: format!("{}", alert.severity),
                message: alert.message.clone(),
                confidence: alert.confidence,
                timestamp: alert.timestamp.to_rfc3339(),
            })
        })
        .collect();
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Json(alerts)
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let outputs = state.outputs.read().unwrap();
    let degraded = outputs.values().filter(|o| o.degraded).count();
    let last_cycle = state
        .cycle_log
        .read()
        .unwrap()
        .last()
        .map(|r| r.cycle_number);

    Json(StatusResponse {
        running: state.running.load(Ordering::SeqCst),
        source: state.source_name.clone(),
        engines: outputs.len(),
        degraded_engines: degraded,
        last_cycle,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/cycles
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleReport>> {
    Json(state.cycle_log.read().unwrap().clone())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Alert, AlertSeverity, Signal};

    fn state_with(outputs: HashMap<String, Output>) -> AppState {
        Arc::new(DashboardState::new(
            Arc::new(RwLock::new(outputs)),
            Arc::new(AtomicBool::new(true)),
            "static",
        ))
    }

    fn sample_outputs() -> HashMap<String, Output> {
        let mut outputs = HashMap::new();
        outputs.insert(
            "net_liquidity".to_string(),
            Output::new("net_liquidity", 61.0, 0.5, Signal::Neutral).with_alert(Alert::new(
                AlertSeverity::Warning,
                "liquidity draining",
                0.8,
            )),
        );
        outputs.insert(
            "liquidity_trend".to_string(),
            Output::degraded("liquidity_trend", "boom", None),
        );
        outputs
    }

    #[tokio::test]
    async fn test_get_outputs_returns_table() {
        let Json(outputs) = get_outputs(State(state_with(sample_outputs()))).await;
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["net_liquidity"].primary_value, 61.0);
    }

    #[tokio::test]
    async fn test_get_output_by_id() {
        let state = state_with(sample_outputs());
        let Json(output) = get_output(State(state.clone()), Path("net_liquidity".into()))
            .await
            .unwrap();
        assert_eq!(output.engine_id, "net_liquidity");

        let err = get_output(State(state), Path("ghost".into()))
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_alerts_flattens_outputs() {
        let Json(alerts) = get_alerts(State(state_with(sample_outputs()))).await;
        // One warning plus the degraded engine's critical alert.
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().any(|a| a.severity == "CRITICAL"));
        assert!(alerts.iter().any(|a| a.severity == "WARNING"));
    }

    #[tokio::test]
    async fn test_get_status_counts_degraded() {
        let Json(status) = get_status(State(state_with(sample_outputs()))).await;
        assert!(status.running);
        assert_eq!(status.engines, 2);
        assert_eq!(status.degraded_engines, 1);
        assert_eq!(status.last_cycle, None);
    }

    #[tokio::test]
    async fn test_cycle_log_is_capped() {
        let state = state_with(HashMap::new());
        for n in 0..150 {
            state.record_cycle(&CycleReport {
                cycle_number: n,
                timestamp: Utc::now(),
                engines_due: 0,
                engines_computed: 0,
                engines_degraded: 0,
                engines_skipped: 0,
                cache_hits: 0,
                duration_ms: 1,
            });
        }

        let Json(cycles) = get_cycles(State(state)).await;
        assert_eq!(cycles.len(), CYCLE_LOG_CAP);
        assert_eq!(cycles.last().unwrap().cycle_number, 149);
    }
}
