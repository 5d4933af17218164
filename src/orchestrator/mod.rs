//! Cycle orchestrator — schedules engines over dependency tiers.
//!
//! One orchestrator owns the whole engine fleet. Each cycle it builds a
//! shared input snapshot, walks the dependency tiers in order, runs the
//! engines that are due (concurrently within a tier), and publishes the
//! merged output table for readers. Engine failures degrade the affected
//! engine only; the cycle always completes.

pub mod retry;

pub use retry::RetryPolicy;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::TtlCache;
use crate::data::MarketDataSource;
use crate::engine::graph::DependencyGraph;
use crate::engine::registry::EngineRegistry;
use crate::engine::Engine;
use crate::types::{CycleReport, EngineError, InputSnapshot, Output};

/// Callback invoked after every completed cycle with the report and the
/// full published output table.
pub type Subscriber = Box<dyn Fn(&CycleReport, &HashMap<String, Output>) + Send + Sync>;

/// Subscribers are stored behind `Arc` so notification runs on a clone of
/// the list with the lock released; a callback may itself call `subscribe`
/// without deadlocking.
type SubscriberList = Vec<Arc<dyn Fn(&CycleReport, &HashMap<String, Output>) + Send + Sync>>;

/// Timing and resilience settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Scheduler tick period. Defaults to the smallest engine cadence,
    /// floored at 100ms.
    pub tick_interval_ms: Option<u64>,
    /// TTL for the shared market-data snapshot. A failed fetch is never
    /// cached.
    pub fetch_ttl_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: None,
            fetch_ttl_ms: 1_000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Mutable cycle state. Guarded by one async mutex so cycles serialize:
/// a manual `execute_cycle` can never interleave with the scheduler loop.
struct Inner {
    registry: EngineRegistry,
    graph: DependencyGraph,
    data_source: Arc<dyn MarketDataSource>,
    config: OrchestratorConfig,
    /// Engine instances, created lazily on the first cycle that needs them.
    instances: HashMap<String, Box<dyn Engine>>,
    outputs: HashMap<String, Output>,
    last_run: HashMap<String, DateTime<Utc>>,
    output_cache: TtlCache<Output>,
    fetch_cache: TtlCache<InputSnapshot>,
    cycle_count: u64,
}

impl Inner {
    async fn run_cycle(&mut self) -> (CycleReport, HashMap<String, Output>) {
        self.cycle_count += 1;
        let started = Instant::now();
        let now = Utc::now();
        self.output_cache.reset_counters();

        let snapshot = self.build_snapshot().await;

        let mut due_count = 0u64;
        let mut computed_count = 0u64;
        let mut degraded_count = 0u64;
        let mut skipped_count = 0u64;

        let tiers = self.graph.tiers().to_vec();
        for tier in &tiers {
            // Select the due engines of this tier, pulling their instances
            // out of the table so the batch can run concurrently.
            let mut batch = Vec::new();
            for desc in tier {
                let is_due = match self.last_run.get(&desc.id) {
                    None => true,
                    Some(last) => {
                        (now - *last).num_milliseconds() >= desc.update_interval_ms as i64
                    }
                };
                if !is_due {
                    continue;
                }
                due_count += 1;

                // A fresh cached output satisfies the run without compute.
                if let Some(cached) = self.output_cache.get(&desc.id, "output") {
                    self.outputs.insert(desc.id.clone(), cached);
                    self.last_run.insert(desc.id.clone(), now);
                    continue;
                }

                if !self.instances.contains_key(&desc.id) {
                    match self.registry.instantiate(&desc.id) {
                        Ok(instance) => {
                            self.instances.insert(desc.id.clone(), instance);
                        }
                        Err(e) => {
                            error!(engine = %desc.id, error = %e, "Engine construction failed");
                            let out =
                                Output::degraded(&desc.id, e.to_string(), self.outputs.get(&desc.id));
                            self.outputs.insert(desc.id.clone(), out);
                            self.last_run.insert(desc.id.clone(), now);
                            degraded_count += 1;
                            continue;
                        }
                    }
                }

                let instance = self.instances.get(&desc.id).expect("instance just ensured");
                if !instance.validate(&snapshot) {
                    debug!(engine = %desc.id, "Required inputs missing, skipping run");
                    skipped_count += 1;
                    continue;
                }

                let dependencies: HashMap<String, Output> = desc
                    .dependencies
                    .iter()
                    .filter_map(|dep| self.outputs.get(dep).map(|o| (dep.clone(), o.clone())))
                    .collect();
                let previous = self.outputs.get(&desc.id).cloned();
                let instance = self.instances.remove(&desc.id).expect("instance present");
                batch.push((desc.clone(), instance, dependencies, previous));
            }

            if batch.is_empty() {
                continue;
            }

            let policy = self.config.retry;
            let snapshot_ref = &snapshot;
            let runs = batch
                .into_iter()
                .map(|(desc, mut instance, dependencies, previous)| async move {
                    let output = retry::run_guarded(
                        instance.as_mut(),
                        snapshot_ref,
                        &dependencies,
                        &policy,
                        previous.as_ref(),
                    )
                    .await;
                    (desc, instance, output)
                });

            for (desc, instance, output) in join_all(runs).await {
                if output.degraded {
                    degraded_count += 1;
                } else {
                    computed_count += 1;
                    self.output_cache
                        .insert(&desc.id, "output", output.clone(), desc.cache_ttl_ms);
                }
                debug!(engine = %desc.id, output = %output, "Engine run complete");
                self.outputs.insert(desc.id.clone(), output);
                self.last_run.insert(desc.id.clone(), now);
                self.instances.insert(desc.id, instance);
            }
        }

        let report = CycleReport {
            cycle_number: self.cycle_count,
            timestamp: now,
            engines_due: due_count,
            engines_computed: computed_count,
            engines_degraded: degraded_count,
            engines_skipped: skipped_count,
            cache_hits: self.output_cache.hits(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        (report, self.outputs.clone())
    }

    /// Build the shared snapshot, consulting the fetch cache first. A
    /// fetch failure yields an empty snapshot for this cycle; engines
    /// whose inputs are missing will skip via `validate`.
    async fn build_snapshot(&mut self) -> InputSnapshot {
        let source_name = self.data_source.name().to_string();
        if let Some(cached) = self.fetch_cache.get(&source_name, "snapshot") {
            return cached;
        }

        let required = self.registry.required_series();
        match self.data_source.fetch_snapshot(&required).await {
            Ok(snapshot) => {
                self.fetch_cache.insert(
                    &source_name,
                    "snapshot",
                    snapshot.clone(),
                    self.config.fetch_ttl_ms,
                );
                snapshot
            }
            Err(e) => {
                warn!(source = %source_name, error = %e, "Market data fetch failed, cycle degraded");
                InputSnapshot::empty()
            }
        }
    }
}

pub struct Orchestrator {
    inner: Arc<AsyncMutex<Inner>>,
    /// Last published output table, readable without touching cycle state.
    published: Arc<RwLock<HashMap<String, Output>>>,
    subscribers: Arc<StdMutex<SubscriberList>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handle: StdMutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
}

impl Orchestrator {
    /// Validate the registry, build the dependency graph, and assemble the
    /// orchestrator. Fails fast on any configuration problem — a cyclic
    /// graph never produces a partially initialized orchestrator.
    pub fn new(
        registry: EngineRegistry,
        data_source: Arc<dyn MarketDataSource>,
        config: OrchestratorConfig,
    ) -> Result<Self, EngineError> {
        registry.validate()?;
        let graph = DependencyGraph::build(&registry.descriptors())?;

        let tick_ms = config
            .tick_interval_ms
            .or_else(|| graph.min_update_interval_ms())
            .unwrap_or(60_000)
            .max(100);

        info!(
            engines = graph.engine_count(),
            tiers = graph.tier_count(),
            tick_ms,
            source = data_source.name(),
            "Orchestrator assembled"
        );

        Ok(Self {
            inner: Arc::new(AsyncMutex::new(Inner {
                registry,
                graph,
                data_source,
                config,
                instances: HashMap::new(),
                outputs: HashMap::new(),
                last_run: HashMap::new(),
                output_cache: TtlCache::new(),
                fetch_cache: TtlCache::new(),
                cycle_count: 0,
            })),
            published: Arc::new(RwLock::new(HashMap::new())),
            subscribers: Arc::new(StdMutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            handle: StdMutex::new(None),
            tick_interval: Duration::from_millis(tick_ms),
        })
    }

    /// Run one cycle now, regardless of the scheduler loop.
    pub async fn execute_cycle(&self) -> CycleReport {
        Self::cycle_once(&self.inner, &self.published, &self.subscribers).await
    }

    /// Start the scheduler: one immediate cycle, then a tick loop in a
    /// background task. Idempotent — a second call is a no-op.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!(tick_ms = self.tick_interval.as_millis() as u64, "Starting orchestrator");
        let report = self.execute_cycle().await;
        info!(%report, "Initial cycle complete");

        let inner = Arc::clone(&self.inner);
        let published = Arc::clone(&self.published);
        let subscribers = Arc::clone(&self.subscribers);
        let running = Arc::clone(&self.running);
        let shutdown = Arc::clone(&self.shutdown);
        let tick = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The interval fires immediately; the initial cycle already ran.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        let report = Self::cycle_once(&inner, &published, &subscribers).await;
                        info!(%report, "Cycle complete");
                    }
                    _ = shutdown.notified() => break,
                }
            }
            debug!("Scheduler loop exited");
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Stop the scheduler. An in-flight cycle drains to completion — the
    /// loop is woken and exits, never aborted mid-cycle.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping orchestrator");
        // notify_one stores a permit, so a loop that is mid-cycle rather
        // than parked in select! still observes the shutdown as soon as
        // the cycle drains instead of waiting out the next tick.
        self.shutdown.notify_one();

        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest published Output of one engine.
    pub fn get_output(&self, engine_id: &str) -> Option<Output> {
        self.published.read().unwrap().get(engine_id).cloned()
    }

    /// Snapshot of the whole published output table.
    pub fn get_all_outputs(&self) -> HashMap<String, Output> {
        self.published.read().unwrap().clone()
    }

    /// Seed the output table with previously persisted values so readers
    /// see last-known data before the engines warm up. Each entry is
    /// superseded once its engine produces a fresh Output; engines that
    /// skip or are not yet due keep serving the restored value.
    pub async fn restore_outputs(&self, outputs: HashMap<String, Output>) {
        let mut inner = self.inner.lock().await;
        inner.outputs.extend(outputs);
        *self.published.write().unwrap() = inner.outputs.clone();
    }

    /// Register a post-cycle callback. Subscriber panics are isolated and
    /// logged; they never take down the cycle loop.
    pub fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers.lock().unwrap().push(Arc::from(subscriber));
    }

    /// Shared handle to the published output table, for read-only
    /// consumers like the dashboard.
    pub fn outputs_handle(&self) -> Arc<RwLock<HashMap<String, Output>>> {
        Arc::clone(&self.published)
    }

    pub fn running_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    async fn cycle_once(
        inner: &AsyncMutex<Inner>,
        published: &RwLock<HashMap<String, Output>>,
        subscribers: &StdMutex<SubscriberList>,
    ) -> CycleReport {
        let (report, outputs) = {
            let mut guard = inner.lock().await;
            guard.run_cycle().await
        };

        *published.write().unwrap() = outputs.clone();

        // Notify on a clone so the lock is free during callbacks.
        let subs = subscribers.lock().unwrap().clone();
        for (index, subscriber) in subs.iter().enumerate() {
            let call = AssertUnwindSafe(|| subscriber(&report, &outputs));
            if std::panic::catch_unwind(call).is_err() {
                error!(subscriber = index, "Subscriber panicked during notification");
            }
        }

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
