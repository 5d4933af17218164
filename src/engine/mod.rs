//! Computation engines — the contract, static metadata, the registry of
//! known engines, and the dependency graph that orders their execution.

pub mod graph;
pub mod net_liquidity;
pub mod liquidity_trend;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::{EngineError, InputSnapshot, Output};

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Engine family, used for grouping on the consuming side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineCategory {
    Liquidity,
    Trend,
    Volatility,
    Sentiment,
    Macro,
}

impl fmt::Display for EngineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCategory::Liquidity => write!(f, "Liquidity"),
            EngineCategory::Trend => write!(f, "Trend"),
            EngineCategory::Volatility => write!(f, "Volatility"),
            EngineCategory::Sentiment => write!(f, "Sentiment"),
            EngineCategory::Macro => write!(f, "Macro"),
        }
    }
}

/// Static metadata for one engine. Built at registry load time and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDescriptor {
    /// Unique engine identifier.
    pub id: String,
    pub display_name: String,
    pub category: EngineCategory,
    /// Higher priority runs first within a tier (ordering inside a tier is
    /// deterministic, not a correctness guarantee).
    pub priority: i32,
    /// Minimum re-execution interval (cadence).
    pub update_interval_ms: u64,
    /// TTL for this engine's cached output. Typically shorter than the
    /// cadence: the cache protects against burst re-execution, not
    /// against staleness.
    pub cache_ttl_ms: u64,
    /// Ids of engines whose Outputs this engine consumes.
    pub dependencies: Vec<String>,
    /// Raw input series this engine reads from the shared snapshot.
    pub required_inputs: Vec<String>,
}

impl EngineDescriptor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            category: EngineCategory::Macro,
            priority: 0,
            update_interval_ms: 60_000,
            cache_ttl_ms: 30_000,
            dependencies: Vec::new(),
            required_inputs: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: EngineCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_update_interval_ms(mut self, interval_ms: u64) -> Self {
        self.update_interval_ms = interval_ms;
        // Keep the default TTL below the cadence unless set explicitly.
        self.cache_ttl_ms = interval_ms / 2;
        self
    }

    pub fn with_cache_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.cache_ttl_ms = ttl_ms;
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_required_inputs(mut self, inputs: &[&str]) -> Self {
        self.required_inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Engine contract
// ---------------------------------------------------------------------------

/// A self-contained computation unit producing one [`Output`] per run.
///
/// Engines own private mutable state (filters, rolling buffers) that only
/// they touch — no locking is needed around it. Everything else an engine
/// reads comes through the snapshot and the resolved dependency outputs.
#[async_trait]
pub trait Engine: Send {
    /// Static metadata for this engine.
    fn descriptor(&self) -> &EngineDescriptor;

    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// Whether the shared snapshot carries everything this engine needs.
    /// When this returns false the orchestrator skips the run silently —
    /// no Output is produced and the previous one stands.
    fn validate(&self, snapshot: &InputSnapshot) -> bool {
        snapshot.has_all(&self.descriptor().required_inputs)
    }

    /// Produce one Output. Dependency outputs are resolved by the
    /// orchestrator from the current cycle before this is called.
    async fn compute(
        &mut self,
        snapshot: &InputSnapshot,
        dependencies: &HashMap<String, Output>,
    ) -> Result<Output, EngineError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
