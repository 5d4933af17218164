//! Adaptive estimation — scalar Kalman filter and a multi-series wrapper.
//!
//! `AdaptiveFilter` turns a noisy scalar observation stream into a smoothed
//! estimate with an uncertainty value. The state-space model is a random
//! walk with identity transition and no control input:
//!
//! - predict:  `cov += Q`
//! - correct:  `k = cov / (cov + R)`, `estimate += k * (m - estimate)`,
//!   `cov = (1 - k) * cov`
//!
//! Engines that need smoothing own one filter per tracked series; filter
//! state is private to the owning engine and never shared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Filter tuning parameters. All noise/covariance values must be positive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Process noise Q — how much the underlying quantity is expected to
    /// drift between observations.
    pub process_noise: f64,
    /// Measurement noise R — how noisy individual observations are.
    pub measurement_noise: f64,
    pub initial_estimate: f64,
    pub initial_covariance: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.01,
            measurement_noise: 0.1,
            initial_estimate: 0.0,
            initial_covariance: 1.0,
        }
    }
}

impl FilterConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.process_noise <= 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "process_noise must be > 0, got {}",
                self.process_noise
            )));
        }
        if self.measurement_noise <= 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "measurement_noise must be > 0, got {}",
                self.measurement_noise
            )));
        }
        if self.initial_covariance <= 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "initial_covariance must be > 0, got {}",
                self.initial_covariance
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filter state
// ---------------------------------------------------------------------------

/// Snapshot of a filter after an update. Mutated only through
/// [`AdaptiveFilter::update`]; callers receive copies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterState {
    pub estimate: f64,
    pub error_covariance: f64,
    /// Derived confidence (0.0–1.0), see [`AdaptiveFilter::confidence`].
    pub confidence: f64,
    pub last_update: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scalar filter
// ---------------------------------------------------------------------------

/// Recursive scalar estimator (one-dimensional Kalman filter).
#[derive(Debug, Clone)]
pub struct AdaptiveFilter {
    config: FilterConfig,
    estimate: f64,
    covariance: f64,
    /// Set after the first measurement has been absorbed.
    warmed: bool,
    last_update: DateTime<Utc>,
}

impl AdaptiveFilter {
    pub fn new(config: FilterConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            estimate: config.initial_estimate,
            covariance: config.initial_covariance,
            warmed: false,
            last_update: Utc::now(),
        })
    }

    /// Absorb one measurement and return the resulting state.
    ///
    /// The very first call is a cold start: the estimate is set to the
    /// measurement directly (no blending against the arbitrary initial
    /// estimate) and the covariance keeps its initial value.
    pub fn update(&mut self, measurement: f64) -> FilterState {
        if !self.warmed {
            self.estimate = measurement;
            self.warmed = true;
            self.last_update = Utc::now();
            return self.state();
        }

        // Predict: identity transition, uncertainty grows by Q.
        let predicted_cov = self.covariance + self.config.process_noise;

        // Correct.
        let gain = predicted_cov / (predicted_cov + self.config.measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.covariance = (1.0 - gain) * predicted_cov;
        self.last_update = Utc::now();

        self.state()
    }

    /// Current estimate. Pure read, no prediction step is applied.
    pub fn predict(&self) -> f64 {
        self.estimate
    }

    /// Derived confidence in the current estimate.
    ///
    /// `clamp(1 - cov / (2 * initial_cov), 0, 1)` — a monotone decreasing
    /// function of uncertainty. This is a design choice for ranking and
    /// display, not a statistically calibrated probability.
    pub fn confidence(&self) -> f64 {
        (1.0 - self.covariance / (2.0 * self.config.initial_covariance)).clamp(0.0, 1.0)
    }

    /// Symmetric uncertainty interval around the estimate.
    ///
    /// Supported confidence levels: 90, 95, 99 (standard z-values).
    pub fn uncertainty_bounds(&self, confidence_level: u8) -> Result<(f64, f64), EngineError> {
        let z = match confidence_level {
            90 => 1.64,
            95 => 1.96,
            99 => 2.58,
            other => {
                return Err(EngineError::InvalidArgument(format!(
                    "unsupported confidence level: {other} (expected 90, 95 or 99)"
                )))
            }
        };
        let sigma = self.covariance.sqrt();
        Ok((self.estimate - z * sigma, self.estimate + z * sigma))
    }

    /// Reinitialize the filter, optionally replacing the configuration.
    /// Clears the cold-start flag: the next update is absorbed directly.
    pub fn reset(&mut self, new_config: Option<FilterConfig>) -> Result<(), EngineError> {
        if let Some(cfg) = new_config {
            cfg.validate()?;
            self.config = cfg;
        }
        self.estimate = self.config.initial_estimate;
        self.covariance = self.config.initial_covariance;
        self.warmed = false;
        self.last_update = Utc::now();
        Ok(())
    }

    pub fn is_warmed(&self) -> bool {
        self.warmed
    }

    fn state(&self) -> FilterState {
        FilterState {
            estimate: self.estimate,
            error_covariance: self.covariance,
            confidence: self.confidence(),
            last_update: self.last_update,
        }
    }
}

// ---------------------------------------------------------------------------
// Multi-series filter
// ---------------------------------------------------------------------------

/// A named collection of independent scalar filters, one per tracked series.
#[derive(Debug, Clone)]
pub struct MultiSeriesFilter {
    filters: HashMap<String, AdaptiveFilter>,
}

impl MultiSeriesFilter {
    /// Create one filter per series id, all sharing the same configuration.
    pub fn new(series_ids: &[String], config: FilterConfig) -> Result<Self, EngineError> {
        let mut filters = HashMap::with_capacity(series_ids.len());
        for id in series_ids {
            filters.insert(id.clone(), AdaptiveFilter::new(config)?);
        }
        Ok(Self { filters })
    }

    /// Update every series present in the batch; absent series are left
    /// untouched. No decay-only step is applied to stale series — their
    /// covariance stays where the last update left it (known gap, kept
    /// to match the observed source behavior).
    pub fn update_all(&mut self, measurements: &HashMap<String, f64>) -> HashMap<String, FilterState> {
        let mut states = HashMap::with_capacity(measurements.len());
        for (id, filter) in self.filters.iter_mut() {
            if let Some(&m) = measurements.get(id) {
                states.insert(id.clone(), filter.update(m));
            }
        }
        states
    }

    /// Current estimate per tracked series.
    pub fn estimates(&self) -> HashMap<String, f64> {
        self.filters
            .iter()
            .map(|(id, f)| (id.clone(), f.predict()))
            .collect()
    }

    /// Minimum confidence across all tracked series — the weakest input
    /// caps the composite's confidence.
    pub fn confidence_floor(&self) -> f64 {
        self.filters
            .values()
            .map(|f| f.confidence())
            .fold(f64::INFINITY, f64::min)
            .min(1.0)
    }

    pub fn get(&self, series_id: &str) -> Option<&AdaptiveFilter> {
        self.filters.get(series_id)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
