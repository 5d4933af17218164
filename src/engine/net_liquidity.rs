//! Net liquidity — the representative adaptive composite estimator.
//!
//! Three raw component series (Fed balance sheet, Treasury general account,
//! reverse repo) are each smoothed through an owned Kalman filter; a
//! weighted linear combination of the filtered estimates produces the
//! composite. Week-over-week and month-over-month deltas of the composite's
//! rolling history drive a three-state regime classifier with hysteresis.
//!
//! Confidence policy for composite engines: the minimum confidence across
//! the component filters (a single weak input caps the whole composite),
//! reduced further when the regime just flipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

use super::{Engine, EngineCategory, EngineDescriptor};
use crate::filter::{FilterConfig, MultiSeriesFilter};
use crate::types::{Alert, AlertSeverity, EngineError, InputSnapshot, Output, Regime};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default component series ids.
pub const FED_BALANCE_SHEET: &str = "fed_balance_sheet";
pub const TREASURY_GENERAL_ACCOUNT: &str = "treasury_general_account";
pub const REVERSE_REPO: &str = "reverse_repo";

/// Bounded history length (roughly one year of daily samples).
const MAX_HISTORY: usize = 365;

/// Samples back for the week-over-week delta.
const WEEKLY_LOOKBACK: usize = 7;

/// Samples back for the month-over-month delta.
const MONTHLY_LOOKBACK: usize = 30;

/// Confidence multiplier applied when the regime differs from the
/// previous sample — penalizes flapping classifications.
const FLAP_PENALTY: f64 = 0.7;

/// How many consecutive rising weekly samples count as a rapid-expansion
/// pattern.
const RAPID_EXPANSION_RUN: usize = 3;

#[derive(Debug, Clone)]
pub struct NetLiquidityConfig {
    /// Component series and their weights in the composite.
    pub components: Vec<(String, f64)>,
    pub filter: FilterConfig,
    /// Weekly delta (%) above which the regime enters EXPANSION.
    pub expansion_threshold: f64,
    /// Weekly delta (%) below which the regime enters CONTRACTION.
    /// Must be below the expansion threshold (hysteresis band).
    pub contraction_threshold: f64,
    /// Weekly delta magnitude (%) that raises an alert.
    pub alert_threshold: f64,
}

impl Default for NetLiquidityConfig {
    fn default() -> Self {
        Self {
            components: vec![
                (FED_BALANCE_SHEET.to_string(), 0.4),
                (TREASURY_GENERAL_ACCOUNT.to_string(), 0.3),
                (REVERSE_REPO.to_string(), 0.3),
            ],
            filter: FilterConfig::default(),
            expansion_threshold: 0.5,
            contraction_threshold: -0.5,
            alert_threshold: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct NetLiquidityEngine {
    descriptor: EngineDescriptor,
    config: NetLiquidityConfig,
    filters: MultiSeriesFilter,
    /// Rolling composite history, newest at the back.
    history: VecDeque<(DateTime<Utc>, f64)>,
    /// Last few regimes, newest at the back, for flap detection.
    recent_regimes: VecDeque<Regime>,
}

impl NetLiquidityEngine {
    pub fn new(config: NetLiquidityConfig) -> Result<Self, EngineError> {
        if config.components.is_empty() {
            return Err(EngineError::Configuration(
                "net_liquidity requires at least one component series".into(),
            ));
        }
        if config.contraction_threshold >= config.expansion_threshold {
            return Err(EngineError::Configuration(format!(
                "contraction threshold {} must be below expansion threshold {}",
                config.contraction_threshold, config.expansion_threshold
            )));
        }

        let series_ids: Vec<String> = config.components.iter().map(|(id, _)| id.clone()).collect();
        let descriptor = EngineDescriptor::new("net_liquidity", "Net Liquidity")
            .with_category(EngineCategory::Liquidity)
            .with_priority(10)
            .with_update_interval_ms(60_000)
            .with_required_inputs(&series_ids.iter().map(String::as_str).collect::<Vec<_>>());

        let filters = MultiSeriesFilter::new(&series_ids, config.filter)?;

        Ok(Self {
            descriptor,
            config,
            filters,
            history: VecDeque::with_capacity(MAX_HISTORY),
            recent_regimes: VecDeque::with_capacity(RAPID_EXPANSION_RUN),
        })
    }

    /// Percentage change of the composite versus `lookback` samples ago.
    /// None until enough history exists.
    fn delta_pct(&self, lookback: usize) -> Option<f64> {
        if self.history.len() <= lookback {
            return None;
        }
        let latest = self.history.back()?.1;
        let past = self.history[self.history.len() - 1 - lookback].1;
        if past.abs() < f64::EPSILON {
            return None;
        }
        Some((latest - past) / past.abs() * 100.0)
    }

    /// Hysteresis classification from the weekly delta.
    fn classify(&self, weekly_delta: Option<f64>) -> Regime {
        match weekly_delta {
            Some(d) if d > self.config.expansion_threshold => Regime::Expansion,
            Some(d) if d < self.config.contraction_threshold => Regime::Contraction,
            _ => Regime::Transition,
        }
    }

    /// True when the last `RAPID_EXPANSION_RUN` weekly deltas were all above
    /// the alert threshold and strictly rising — the "rapid unannounced
    /// expansion" pattern.
    fn rapid_expansion(&self) -> bool {
        if self.history.len() < WEEKLY_LOOKBACK + RAPID_EXPANSION_RUN {
            return false;
        }
        let n = self.history.len();
        let mut last_delta = f64::NEG_INFINITY;
        for offset in (0..RAPID_EXPANSION_RUN).rev() {
            let latest = self.history[n - 1 - offset].1;
            let past = self.history[n - 1 - offset - WEEKLY_LOOKBACK].1;
            if past.abs() < f64::EPSILON {
                return false;
            }
            let delta = (latest - past) / past.abs() * 100.0;
            if delta <= self.config.alert_threshold || delta <= last_delta {
                return false;
            }
            last_delta = delta;
        }
        true
    }

    fn build_alerts(&self, weekly_delta: Option<f64>, confidence: f64) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if let Some(delta) = weekly_delta {
            if delta.abs() > self.config.alert_threshold {
                let severity = if delta.abs() > 2.0 * self.config.alert_threshold {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                };
                let direction = if delta > 0.0 { "expanded" } else { "contracted" };
                alerts.push(Alert::new(
                    severity,
                    format!("Net liquidity {direction} {delta:.2}% week-over-week"),
                    confidence,
                ));
            }
        }

        if self.rapid_expansion() {
            alerts.push(Alert::new(
                AlertSeverity::Critical,
                format!(
                    "Rapid liquidity expansion: {RAPID_EXPANSION_RUN} consecutive accelerating weekly gains"
                ),
                confidence,
            ));
        }

        alerts
    }
}

#[async_trait]
impl Engine for NetLiquidityEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn compute(
        &mut self,
        snapshot: &InputSnapshot,
        _dependencies: &HashMap<String, Output>,
    ) -> Result<Output, EngineError> {
        // Smooth each raw component through its filter.
        let mut measurements = HashMap::new();
        for (series_id, _) in &self.config.components {
            match snapshot.get(series_id) {
                Some(v) if v.is_finite() => {
                    measurements.insert(series_id.clone(), v);
                }
                _ => {
                    return Err(EngineError::Computation {
                        engine: self.id().to_string(),
                        reason: format!("missing component series '{series_id}'"),
                    })
                }
            }
        }
        self.filters.update_all(&measurements);

        // Weighted linear combination of the filtered estimates.
        let estimates = self.filters.estimates();
        let composite: f64 = self
            .config
            .components
            .iter()
            .map(|(id, weight)| weight * estimates[id])
            .sum();

        self.history.push_back((snapshot.fetched_at, composite));
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }

        let weekly_delta = self.delta_pct(WEEKLY_LOOKBACK);
        let monthly_delta = self.delta_pct(MONTHLY_LOOKBACK);
        let regime = self.classify(weekly_delta);

        // Confidence: minimum across the component filters, penalized when
        // the classification just flipped (only meaningful once a weekly
        // delta exists at all).
        let mut confidence = self.filters.confidence_floor();
        let flipped = weekly_delta.is_some()
            && self
                .recent_regimes
                .back()
                .map(|prev| *prev != regime)
                .unwrap_or(false);
        if flipped {
            confidence *= FLAP_PENALTY;
        }

        self.recent_regimes.push_back(regime);
        while self.recent_regimes.len() > RAPID_EXPANSION_RUN {
            self.recent_regimes.pop_front();
        }

        let alerts = self.build_alerts(weekly_delta, confidence);

        let analysis = match weekly_delta {
            Some(w) => format!(
                "Net liquidity composite at {composite:.2} ({regime}); weekly {w:+.2}%, monthly {}",
                monthly_delta
                    .map(|m| format!("{m:+.2}%"))
                    .unwrap_or_else(|| "n/a".to_string()),
            ),
            None => format!(
                "Net liquidity composite at {composite:.2}; insufficient history for regime ({} of {} samples)",
                self.history.len(),
                WEEKLY_LOOKBACK + 1,
            ),
        };

        let mut output = Output::new(self.id(), composite, confidence, regime.signal())
            .with_analysis(analysis)
            .with_sub_metric("history_len", self.history.len() as f64);
        for (id, _) in &self.config.components {
            output = output.with_sub_metric(format!("filtered_{id}"), estimates[id]);
        }
        if let Some(w) = weekly_delta {
            output = output.with_sub_metric("weekly_delta_pct", w);
        }
        if let Some(m) = monthly_delta {
            output = output.with_sub_metric("monthly_delta_pct", m);
        }
        for alert in alerts {
            output = output.with_alert(alert);
        }

        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
