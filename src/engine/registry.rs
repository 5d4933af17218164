//! Engine registry — the explicit table of known engines.
//!
//! Each registration pairs an immutable descriptor with a constructor.
//! The table is plain data, no stringly-typed dispatch: adding an engine
//! means adding one entry to [`EngineRegistry::builtin`]. The registry
//! validates itself (unique ids, known dependency ids) before the
//! orchestrator builds the dependency graph from it.

use std::collections::HashSet;

use super::liquidity_trend::{LiquidityTrendConfig, LiquidityTrendEngine};
use super::net_liquidity::{NetLiquidityConfig, NetLiquidityEngine};
use super::{Engine, EngineDescriptor};
use crate::types::EngineError;

/// Constructor for one engine instance. Instances are created lazily by
/// the orchestrator on the first scheduling pass that needs them.
pub type EngineFactory = Box<dyn Fn() -> Result<Box<dyn Engine>, EngineError> + Send + Sync>;

pub struct EngineRegistration {
    pub descriptor: EngineDescriptor,
    pub factory: EngineFactory,
}

pub struct EngineRegistry {
    registrations: Vec<EngineRegistration>,
}

impl EngineRegistry {
    /// An empty registry, for tests that assemble their own engine sets.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// The shipped engine catalog.
    pub fn builtin() -> Result<Self, EngineError> {
        let mut registry = Self::new();

        let net_liquidity = NetLiquidityEngine::new(NetLiquidityConfig::default())?;
        registry.register(EngineRegistration {
            descriptor: net_liquidity.descriptor().clone(),
            factory: Box::new(|| {
                Ok(Box::new(NetLiquidityEngine::new(NetLiquidityConfig::default())?))
            }),
        })?;

        let liquidity_trend = LiquidityTrendEngine::new(LiquidityTrendConfig::default())?;
        registry.register(EngineRegistration {
            descriptor: liquidity_trend.descriptor().clone(),
            factory: Box::new(|| {
                Ok(Box::new(LiquidityTrendEngine::new(
                    LiquidityTrendConfig::default(),
                )?))
            }),
        })?;

        Ok(registry)
    }

    /// Add a registration. Fails on duplicate ids.
    pub fn register(&mut self, registration: EngineRegistration) -> Result<(), EngineError> {
        if self
            .registrations
            .iter()
            .any(|r| r.descriptor.id == registration.descriptor.id)
        {
            return Err(EngineError::Configuration(format!(
                "duplicate engine id '{}'",
                registration.descriptor.id
            )));
        }
        self.registrations.push(registration);
        Ok(())
    }

    /// Validate that every declared dependency refers to a registered
    /// engine. Cycle detection happens in the dependency graph.
    pub fn validate(&self) -> Result<(), EngineError> {
        let ids: HashSet<&str> = self
            .registrations
            .iter()
            .map(|r| r.descriptor.id.as_str())
            .collect();
        for reg in &self.registrations {
            for dep in &reg.descriptor.dependencies {
                if !ids.contains(dep.as_str()) {
                    return Err(EngineError::Configuration(format!(
                        "engine '{}' depends on unregistered engine '{}'",
                        reg.descriptor.id, dep
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn descriptors(&self) -> Vec<EngineDescriptor> {
        self.registrations
            .iter()
            .map(|r| r.descriptor.clone())
            .collect()
    }

    /// Construct a fresh instance of the named engine.
    pub fn instantiate(&self, engine_id: &str) -> Result<Box<dyn Engine>, EngineError> {
        let registration = self
            .registrations
            .iter()
            .find(|r| r.descriptor.id == engine_id)
            .ok_or_else(|| {
                EngineError::Configuration(format!("unknown engine id '{engine_id}'"))
            })?;
        (registration.factory)()
    }

    /// The union of raw input series required across all engines — what
    /// the orchestrator asks the data collaborator for each cycle.
    pub fn required_series(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut series = Vec::new();
        for reg in &self.registrations {
            for input in &reg.descriptor.required_inputs {
                if seen.insert(input.clone()) {
                    series.push(input.clone());
                }
            }
        }
        series.sort_unstable();
        series
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
