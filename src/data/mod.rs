//! Market-data collaborators.
//!
//! The orchestrator builds one shared [`InputSnapshot`] per cycle through
//! the `MarketDataSource` seam. Real third-party fetch proxies live outside
//! this crate; what ships here is a fixed-value source for tests and demos
//! and a seeded random-walk source so the binary runs end to end without
//! any external feed.

pub mod synthetic;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::InputSnapshot;

/// Abstraction over market-data providers.
///
/// A fetch failure is a global degraded-cycle condition: the orchestrator
/// proceeds with an empty snapshot and engines skip via `validate`.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch current values for the requested series ids. Series the
    /// source does not know may simply be absent from the result.
    async fn fetch_snapshot(&self, required_series: &[String]) -> Result<InputSnapshot>;

    /// Source name for logging and identification.
    fn name(&self) -> &str;
}

/// Fixed-value source. Values can be replaced between cycles and an error
/// can be forced, which makes it the workhorse for orchestrator tests.
pub struct StaticSource {
    values: Mutex<HashMap<String, f64>>,
    force_error: Mutex<Option<String>>,
}

impl StaticSource {
    pub fn new(values: HashMap<String, f64>) -> Self {
        Self {
            values: Mutex::new(values),
            force_error: Mutex::new(None),
        }
    }

    /// Replace the value of one series.
    pub fn set(&self, series_id: &str, value: f64) {
        self.values
            .lock()
            .unwrap()
            .insert(series_id.to_string(), value);
    }

    /// Force all subsequent fetches to fail.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }
}

#[async_trait]
impl MarketDataSource for StaticSource {
    async fn fetch_snapshot(&self, required_series: &[String]) -> Result<InputSnapshot> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            anyhow::bail!("{}", err);
        }
        let values = self.values.lock().unwrap();
        let selected: HashMap<String, f64> = required_series
            .iter()
            .filter_map(|id| values.get(id).map(|&v| (id.clone(), v)))
            .collect();
        Ok(InputSnapshot::new(selected))
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
