//! Synthetic market data — seeded random-walk series.
//!
//! Each configured series starts from a base level and takes a small
//! Gaussian-ish step on every fetch. Deterministic for a given seed, which
//! keeps demo runs reproducible.

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

use super::MarketDataSource;
use crate::types::InputSnapshot;

/// Per-series random-walk parameters.
#[derive(Debug, Clone)]
pub struct SeriesSpec {
    pub series_id: String,
    pub base_level: f64,
    /// Maximum absolute step per fetch, as a fraction of the base level.
    pub step_pct: f64,
}

impl SeriesSpec {
    pub fn new(series_id: impl Into<String>, base_level: f64, step_pct: f64) -> Self {
        Self {
            series_id: series_id.into(),
            base_level,
            step_pct,
        }
    }
}

struct WalkState {
    rng: StdRng,
    levels: HashMap<String, f64>,
}

/// Random-walk source over a fixed set of series.
pub struct SyntheticSource {
    specs: Vec<SeriesSpec>,
    state: Mutex<WalkState>,
}

impl SyntheticSource {
    pub fn new(specs: Vec<SeriesSpec>, seed: u64) -> Self {
        let levels = specs
            .iter()
            .map(|s| (s.series_id.clone(), s.base_level))
            .collect();
        Self {
            specs,
            state: Mutex::new(WalkState {
                rng: StdRng::seed_from_u64(seed),
                levels,
            }),
        }
    }

    /// The default demo universe: the net-liquidity component series.
    pub fn default_universe(seed: u64) -> Self {
        Self::new(
            vec![
                SeriesSpec::new("fed_balance_sheet", 7_800.0, 0.002),
                SeriesSpec::new("treasury_general_account", 750.0, 0.01),
                SeriesSpec::new("reverse_repo", 450.0, 0.015),
            ],
            seed,
        )
    }
}

#[async_trait]
impl MarketDataSource for SyntheticSource {
    async fn fetch_snapshot(&self, required_series: &[String]) -> Result<InputSnapshot> {
        let mut state = self.state.lock().unwrap();

        // Advance every tracked series, then project the requested ones.
        for spec in &self.specs {
            let step_range = spec.base_level * spec.step_pct;
            let step = state.rng.gen_range(-step_range..=step_range);
            let level = state.levels.get_mut(&spec.series_id).expect("known series");
            *level = (*level + step).max(0.0);
        }

        let values = required_series
            .iter()
            .filter_map(|id| state.levels.get(id).map(|&v| (id.clone(), v)))
            .collect();
        Ok(InputSnapshot::new(values))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
