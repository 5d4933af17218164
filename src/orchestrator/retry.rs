//! Timeout/retry guard around a single engine execution.
//!
//! Races `compute()` against an execution budget, retries failures with a
//! linear backoff, and degrades instead of propagating — a misbehaving
//! engine must never take the cycle down with it.

use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::types::{EngineError, InputSnapshot, Output};

/// Execution budget and retry settings for one engine run.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout_ms: u64,
    /// Retries after the initial attempt.
    pub retry_attempts: u32,
    /// Backoff before retry `n` is `n × base_delay`.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            retry_attempts: 2,
            base_delay_ms: 250,
        }
    }
}

/// Run one engine under the policy. Always returns an Output — success,
/// or a degraded one carrying the last error after retries are exhausted.
///
/// On timeout the compute future is dropped at the race boundary; this
/// cancels cooperatively at the next await point, so a purely CPU-bound
/// compute can overrun its budget until it yields.
pub async fn run_guarded(
    engine: &mut dyn Engine,
    snapshot: &InputSnapshot,
    dependencies: &HashMap<String, Output>,
    policy: &RetryPolicy,
    previous: Option<&Output>,
) -> Output {
    let engine_id = engine.id().to_string();
    let budget = Duration::from_millis(policy.timeout_ms);
    let mut last_error: Option<EngineError> = None;

    for attempt in 1..=(policy.retry_attempts + 1) {
        if attempt > 1 {
            let delay = Duration::from_millis((attempt as u64 - 1) * policy.base_delay_ms);
            debug!(
                engine = %engine_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying engine execution"
            );
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(budget, engine.compute(snapshot, dependencies)).await {
            Ok(Ok(output)) => {
                if attempt > 1 {
                    debug!(engine = %engine_id, attempt, "Engine recovered on retry");
                }
                return output;
            }
            Ok(Err(e)) => {
                warn!(engine = %engine_id, attempt, error = %e, "Engine compute failed");
                last_error = Some(e);
            }
            Err(_) => {
                warn!(
                    engine = %engine_id,
                    attempt,
                    timeout_ms = policy.timeout_ms,
                    "Engine exceeded execution budget"
                );
                last_error = Some(EngineError::Timeout {
                    engine: engine_id.clone(),
                    timeout_ms: policy.timeout_ms,
                });
            }
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown failure".to_string());
    warn!(engine = %engine_id, error = %reason, "Retries exhausted, degrading output");
    Output::degraded(engine_id, reason, previous)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineDescriptor;
    use crate::types::Signal;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Scripted engine: fails the first `fail_first` attempts, then
    /// succeeds; optionally sleeps before answering.
    struct ScriptedEngine {
        descriptor: EngineDescriptor,
        fail_first: u32,
        sleep_ms: u64,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedEngine {
        fn new(fail_first: u32, sleep_ms: u64) -> Self {
            Self {
                descriptor: EngineDescriptor::new("scripted", "Scripted"),
                fail_first,
                sleep_ms,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl Engine for ScriptedEngine {
        fn descriptor(&self) -> &EngineDescriptor {
            &self.descriptor
        }

        async fn compute(
            &mut self,
            _snapshot: &InputSnapshot,
            _dependencies: &HashMap<String, Output>,
        ) -> Result<Output, EngineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.sleep_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.sleep_ms)).await;
            }
            if call <= self.fail_first {
                return Err(EngineError::Computation {
                    engine: "scripted".into(),
                    reason: format!("scripted failure #{call}"),
                });
            }
            Ok(Output::new("scripted", 1.0, 0.9, Signal::Neutral))
        }
    }

    fn policy(timeout_ms: u64, retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout_ms,
            retry_attempts: retries,
            base_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let mut engine = ScriptedEngine::new(0, 0);
        let out = run_guarded(
            &mut engine,
            &InputSnapshot::empty(),
            &HashMap::new(),
            &policy(1000, 2),
            None,
        )
        .await;
        assert!(!out.degraded);
        assert_eq!(out.primary_value, 1.0);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let mut engine = ScriptedEngine::new(1, 0);
        let out = run_guarded(
            &mut engine,
            &InputSnapshot::empty(),
            &HashMap::new(),
            &policy(1000, 2),
            None,
        )
        .await;
        assert!(!out.degraded);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_degrades_after_exhausting_retries() {
        let mut engine = ScriptedEngine::new(u32::MAX, 0);
        let calls = engine.calls.clone();
        let out = run_guarded(
            &mut engine,
            &InputSnapshot::empty(),
            &HashMap::new(),
            &policy(1000, 2),
            None,
        )
        .await;

        assert!(out.degraded);
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.signal, Signal::Neutral);
        assert!(out.error.as_deref().unwrap().contains("scripted failure"));
        // Initial attempt + 2 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_degrades_with_timeout_error() {
        let mut engine = ScriptedEngine::new(0, 200);
        let out = run_guarded(
            &mut engine,
            &InputSnapshot::empty(),
            &HashMap::new(),
            &policy(20, 1),
            None,
        )
        .await;

        assert!(out.degraded);
        assert!(out.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_degraded_keeps_previous_value() {
        let mut engine = ScriptedEngine::new(u32::MAX, 0);
        let previous = Output::new("scripted", 42.0, 0.8, Signal::Bullish);
        let out = run_guarded(
            &mut engine,
            &InputSnapshot::empty(),
            &HashMap::new(),
            &policy(1000, 0),
            Some(&previous),
        )
        .await;

        assert!(out.degraded);
        assert_eq!(out.primary_value, 42.0);
        assert_eq!(out.signal, Signal::Neutral);
    }
}
