//! Mock engine for integration testing.
//!
//! Provides a deterministic `Engine` implementation whose output value,
//! failure mode, and call count are all controllable from test code via
//! a shared handle — the engine instance itself lives inside the
//! orchestrator.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use macroscope::engine::registry::EngineRegistration;
use macroscope::engine::{Engine, EngineDescriptor};
use macroscope::types::{EngineError, InputSnapshot, Output, Signal};

/// Test-side handle to a [`MockEngine`] owned by the orchestrator.
#[derive(Clone)]
pub struct MockEngineHandle {
    value: Arc<Mutex<f64>>,
    force_error: Arc<Mutex<Option<String>>>,
    computed: Arc<AtomicU32>,
}

impl MockEngineHandle {
    /// Change the value the engine will report on its next run.
    pub fn set_value(&self, value: f64) {
        *self.value.lock().unwrap() = value;
    }

    /// Force all subsequent computes to fail.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// How many times compute() has run.
    pub fn computed(&self) -> u32 {
        self.computed.load(Ordering::SeqCst)
    }
}

pub struct MockEngine {
    descriptor: EngineDescriptor,
    value: Arc<Mutex<f64>>,
    force_error: Arc<Mutex<Option<String>>>,
    computed: Arc<AtomicU32>,
}

#[async_trait]
impl Engine for MockEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn compute(
        &mut self,
        _snapshot: &InputSnapshot,
        dependencies: &HashMap<String, Output>,
    ) -> Result<Output, EngineError> {
        self.computed.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(EngineError::Computation {
                engine: self.id().to_string(),
                reason: err.clone(),
            });
        }

        let value = *self.value.lock().unwrap();
        let mut output = Output::new(self.id(), value, 0.9, Signal::Neutral)
            .with_sub_metric("dependency_count", dependencies.len() as f64);
        for (dep_id, dep) in dependencies {
            output = output.with_sub_metric(format!("dep_{dep_id}"), dep.primary_value);
        }
        Ok(output)
    }
}

/// Build a registration for a mock engine plus the handle controlling it.
/// The factory shares the handle's state, so the handle stays live across
/// lazy instantiation inside the orchestrator.
pub fn mock_registration(
    descriptor: EngineDescriptor,
    initial_value: f64,
) -> (EngineRegistration, MockEngineHandle) {
    let handle = MockEngineHandle {
        value: Arc::new(Mutex::new(initial_value)),
        force_error: Arc::new(Mutex::new(None)),
        computed: Arc::new(AtomicU32::new(0)),
    };

    let factory_desc = descriptor.clone();
    let factory_handle = handle.clone();
    let registration = EngineRegistration {
        descriptor,
        factory: Box::new(move || {
            Ok(Box::new(MockEngine {
                descriptor: factory_desc.clone(),
                value: Arc::clone(&factory_handle.value),
                force_error: Arc::clone(&factory_handle.force_error),
                computed: Arc::clone(&factory_handle.computed),
            }))
        }),
    };

    (registration, handle)
}
