//! Liquidity trend — a dependent engine consuming the net-liquidity Output.
//!
//! Smooths the change of the composite between cycles through its own
//! scalar filter and classifies the smoothed slope into a directional
//! signal. Exists one tier above `net_liquidity` in the dependency graph,
//! so it always observes the current cycle's composite.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{Engine, EngineCategory, EngineDescriptor};
use crate::filter::{AdaptiveFilter, FilterConfig};
use crate::types::{EngineError, InputSnapshot, Output, Signal};

/// Id of the upstream engine this one consumes.
pub const UPSTREAM: &str = "net_liquidity";

#[derive(Debug, Clone)]
pub struct LiquidityTrendConfig {
    pub filter: FilterConfig,
    /// Smoothed per-cycle change above which the trend reads bullish
    /// (mirrored for bearish).
    pub slope_threshold: f64,
}

impl Default for LiquidityTrendConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            slope_threshold: 0.1,
        }
    }
}

pub struct LiquidityTrendEngine {
    descriptor: EngineDescriptor,
    config: LiquidityTrendConfig,
    slope_filter: AdaptiveFilter,
    last_composite: Option<f64>,
}

impl LiquidityTrendEngine {
    pub fn new(config: LiquidityTrendConfig) -> Result<Self, EngineError> {
        let descriptor = EngineDescriptor::new("liquidity_trend", "Liquidity Trend")
            .with_category(EngineCategory::Trend)
            .with_priority(5)
            .with_update_interval_ms(60_000)
            .with_dependencies(&[UPSTREAM]);

        Ok(Self {
            descriptor,
            slope_filter: AdaptiveFilter::new(config.filter)?,
            config,
            last_composite: None,
        })
    }
}

#[async_trait]
impl Engine for LiquidityTrendEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    /// Validates against the dependency output, not raw series — the
    /// snapshot check is a no-op for this engine.
    fn validate(&self, _snapshot: &InputSnapshot) -> bool {
        true
    }

    async fn compute(
        &mut self,
        _snapshot: &InputSnapshot,
        dependencies: &HashMap<String, Output>,
    ) -> Result<Output, EngineError> {
        let upstream = dependencies.get(UPSTREAM).ok_or_else(|| EngineError::Computation {
            engine: self.id().to_string(),
            reason: format!("missing dependency output '{UPSTREAM}'"),
        })?;

        if upstream.degraded {
            return Err(EngineError::Computation {
                engine: self.id().to_string(),
                reason: format!("dependency '{UPSTREAM}' is degraded"),
            });
        }

        let composite = upstream.primary_value;
        let raw_slope = match self.last_composite {
            Some(prev) => composite - prev,
            None => 0.0,
        };
        self.last_composite = Some(composite);

        let state = self.slope_filter.update(raw_slope);
        let slope = state.estimate;

        let signal = if slope > self.config.slope_threshold {
            Signal::Bullish
        } else if slope < -self.config.slope_threshold {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        // The trend can only be as trustworthy as its input: combine the
        // slope filter's confidence with the upstream confidence via
        // minimum, the crate-wide policy for composed confidences.
        let confidence = state.confidence.min(upstream.confidence);

        Ok(Output::new(self.id(), slope, confidence, signal)
            .with_sub_metric("raw_slope", raw_slope)
            .with_sub_metric("upstream_composite", composite)
            .with_sub_metric("upstream_confidence", upstream.confidence)
            .with_analysis(format!(
                "Smoothed liquidity slope {slope:+.4} per cycle (composite {composite:.2})"
            )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
