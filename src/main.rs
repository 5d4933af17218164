//! MACROSCOPE — Adaptive macro-signal engine orchestrator
//!
//! Entry point. Loads configuration, initialises structured logging,
//! assembles the engine registry and orchestrator, optionally restores
//! the last published outputs from disk, and runs until shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use macroscope::config::AppConfig;
use macroscope::dashboard;
use macroscope::dashboard::routes::DashboardState;
use macroscope::data::synthetic::SyntheticSource;
use macroscope::engine::registry::EngineRegistry;
use macroscope::orchestrator::Orchestrator;
use macroscope::storage;

const BANNER: &str = r#"
 __  __    _    ____ ____   ___  ____   ____ ___  ____  _____
|  \/  |  / \  / ___|  _ \ / _ \/ ___| / ___/ _ \|  _ \| ____|
| |\/| | / _ \| |   | |_) | | | \___ \| |  | | | | |_) |  _|
| |  | |/ ___ \ |___|  _ <| |_| |___) | |__| |_| |  __/| |___
|_|  |_/_/   \_\____|_| \_\\___/|____/ \____\___/|_|   |_____|

  Adaptive Macro-Signal Engine Orchestrator
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_or_default("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        seed = cfg.data.seed,
        dashboard = cfg.dashboard.enabled,
        persistence = cfg.persistence.enabled,
        "MACROSCOPE starting up"
    );

    // -- Assemble components ---------------------------------------------

    let registry = EngineRegistry::builtin()?;
    info!(engines = registry.len(), "Engine registry loaded");

    let source = Arc::new(SyntheticSource::default_universe(cfg.data.seed));
    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        source,
        cfg.orchestrator_config(),
    )?);

    // Serve last-known values while the engines warm up.
    if cfg.persistence.enabled {
        match storage::load_outputs(Some(&cfg.persistence.outputs_file)) {
            Ok(Some(outputs)) => orchestrator.restore_outputs(outputs).await,
            Ok(None) => {}
            Err(e) => error!(error = %e, "Failed to restore saved outputs"),
        }
    }

    // -- Dashboard --------------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            orchestrator.outputs_handle(),
            orchestrator.running_handle(),
            "synthetic",
        ));

        let recorder = Arc::clone(&state);
        orchestrator.subscribe(Box::new(move |report, _| {
            recorder.record_cycle(report);
        }));

        dashboard::spawn_dashboard(state, cfg.dashboard.port)?;
    }

    // Persist the output table after every cycle.
    if cfg.persistence.enabled {
        let path = cfg.persistence.outputs_file.clone();
        orchestrator.subscribe(Box::new(move |_, outputs| {
            if let Err(e) = storage::save_outputs(outputs, Some(&path)) {
                error!(error = %e, "Failed to save outputs");
            }
        }));
    }

    // -- Run until shutdown -----------------------------------------------

    orchestrator.start().await;
    info!("Running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    orchestrator.stop().await;

    if cfg.persistence.enabled {
        storage::save_outputs(
            &orchestrator.get_all_outputs(),
            Some(&cfg.persistence.outputs_file),
        )?;
    }
    info!("MACROSCOPE shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("macroscope=info"));

    let json_logging = std::env::var("MACROSCOPE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
