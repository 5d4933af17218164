//! Shared types for the MACROSCOPE core.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that engine, orchestrator,
//! data, and dashboard modules can depend on them without circular
//! references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// Signals and regimes
// ---------------------------------------------------------------------------

/// Directional read of an engine's signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Bullish => write!(f, "BULLISH"),
            Signal::Bearish => write!(f, "BEARISH"),
            Signal::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Discrete classification of a composite signal's trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Expansion,
    Contraction,
    Transition,
}

impl Regime {
    /// The directional signal implied by this regime.
    pub fn signal(&self) -> Signal {
        match self {
            Regime::Expansion => Signal::Bullish,
            Regime::Contraction => Signal::Bearish,
            Regime::Transition => Signal::Neutral,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Expansion => write!(f, "EXPANSION"),
            Regime::Contraction => write!(f, "CONTRACTION"),
            Regime::Transition => write!(f, "TRANSITION"),
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "INFO"),
            AlertSeverity::Warning => write!(f, "WARNING"),
            AlertSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// An alert carried inside an [`Output`]. Pure data, no lifecycle of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub message: String,
    /// Confidence in the alert condition (0.0–1.0).
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, message: impl Into<String>, confidence: f64) -> Self {
        Self {
            severity,
            message: message.into(),
            confidence,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// The normalized result envelope every engine produces.
///
/// Immutable once constructed — a new run supersedes the previous Output,
/// it never mutates it. Sub-metrics use an ordered map so downstream
/// consumers see a deterministic field order regardless of engine family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub engine_id: String,
    pub primary_value: f64,
    /// Confidence in the primary value (0.0–1.0).
    pub confidence: f64,
    pub signal: Signal,
    pub sub_metrics: BTreeMap<String, f64>,
    /// Human-readable summary of what the engine saw.
    pub analysis: String,
    pub alerts: Vec<Alert>,
    pub produced_at: DateTime<Utc>,
    /// True when this Output was produced by the failure path rather than
    /// a successful compute.
    pub degraded: bool,
    /// The error that caused degradation, when `degraded` is set.
    pub error: Option<String>,
}

impl Output {
    /// Build a successful Output.
    pub fn new(
        engine_id: impl Into<String>,
        primary_value: f64,
        confidence: f64,
        signal: Signal,
    ) -> Self {
        Self {
            engine_id: engine_id.into(),
            primary_value,
            confidence: confidence.clamp(0.0, 1.0),
            signal,
            sub_metrics: BTreeMap::new(),
            analysis: String::new(),
            alerts: Vec::new(),
            produced_at: Utc::now(),
            degraded: false,
            error: None,
        }
    }

    pub fn with_sub_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.sub_metrics.insert(name.into(), value);
        self
    }

    pub fn with_analysis(mut self, analysis: impl Into<String>) -> Self {
        self.analysis = analysis.into();
        self
    }

    pub fn with_alert(mut self, alert: Alert) -> Self {
        self.alerts.push(alert);
        self
    }

    /// Build a degraded Output after retry exhaustion.
    ///
    /// Keeps the last-known-good shape (primary value and sub-metrics) when
    /// a previous Output exists, so consumers can distinguish "no data yet"
    /// from "data unavailable now". Confidence drops to zero, the signal is
    /// forced to neutral, and the failure is attached as a critical alert.
    pub fn degraded(
        engine_id: impl Into<String>,
        error: impl Into<String>,
        previous: Option<&Output>,
    ) -> Self {
        let engine_id = engine_id.into();
        let error = error.into();
        let (primary_value, sub_metrics) = match previous {
            Some(prev) => (prev.primary_value, prev.sub_metrics.clone()),
            None => (0.0, BTreeMap::new()),
        };

        Self {
            engine_id: engine_id.clone(),
            primary_value,
            confidence: 0.0,
            signal: Signal::Neutral,
            sub_metrics,
            analysis: format!("Engine '{engine_id}' degraded: {error}"),
            alerts: vec![Alert::new(
                AlertSeverity::Critical,
                format!("Engine '{engine_id}' failed: {error}"),
                1.0,
            )],
            produced_at: Utc::now(),
            degraded: true,
            error: Some(error),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} = {:.4} (conf: {:.2} | alerts: {}{})",
            self.engine_id,
            self.signal,
            self.primary_value,
            self.confidence,
            self.alerts.len(),
            if self.degraded { " | DEGRADED" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Input snapshot
// ---------------------------------------------------------------------------

/// The shared input snapshot built once per cycle from the market-data
/// collaborator. Engines read named scalar series from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub values: HashMap<String, f64>,
    pub fetched_at: DateTime<Utc>,
}

impl InputSnapshot {
    pub fn new(values: HashMap<String, f64>) -> Self {
        Self {
            values,
            fetched_at: Utc::now(),
        }
    }

    /// An empty snapshot, used when the data collaborator fails for a
    /// cycle. Engines whose inputs are missing will skip via `validate`.
    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    pub fn get(&self, series_id: &str) -> Option<f64> {
        self.values.get(series_id).copied()
    }

    /// True when every named series is present and finite.
    pub fn has_all(&self, series_ids: &[String]) -> bool {
        series_ids
            .iter()
            .all(|id| self.get(id).map(f64::is_finite).unwrap_or(false))
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of a single orchestrator execution cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub timestamp: DateTime<Utc>,
    pub engines_due: u64,
    pub engines_computed: u64,
    pub engines_degraded: u64,
    pub engines_skipped: u64,
    pub cache_hits: u64,
    pub duration_ms: u64,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle #{}: due={} computed={} degraded={} skipped={} cache_hits={} ({}ms)",
            self.cycle_number,
            self.engines_due,
            self.engines_computed,
            self.engines_degraded,
            self.engines_skipped,
            self.cache_hits,
            self.duration_ms,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the engine core.
///
/// Validation skips are not errors — `Engine::validate` returning false is
/// ordinary control flow, as is a cache miss.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Cyclic or malformed dependency graph. Fatal at initialization.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An engine failed during compute. Caught, retried, then degraded.
    #[error("Computation failed for engine '{engine}': {reason}")]
    Computation { engine: String, reason: String },

    /// An engine exceeded its execution budget.
    #[error("Engine '{engine}' timed out after {timeout_ms}ms")]
    Timeout { engine: String, timeout_ms: u64 },

    /// Invalid argument to a numeric routine (e.g. unsupported
    /// confidence level for uncertainty bounds).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
