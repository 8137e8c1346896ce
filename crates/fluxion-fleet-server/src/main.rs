// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fluxion_fleet_core::{FleetEngine, TreeStore};
use fluxion_fleet_server::api::{self, AppState};
use fluxion_fleet_server::config::FleetServerConfig;
use fluxion_fleet_server::db::{Database, Topology};
use fluxion_fleet_server::monitor;

/// Fleet command propagation server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "fleet_config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("fluxion_fleet_server=info,fluxion_fleet_core=info")
            }),
        )
        .init();

    let args = Args::parse();
    info!(path = %args.config, "Loading configuration");
    let config = FleetServerConfig::from_file(&args.config)?;

    let db = Arc::new(Database::open(&config.database.path)?);
    info!(path = %config.database.path, "Database opened");

    if let Some(seed_path) = &config.database.seed_path {
        let topology = Topology::from_file(seed_path)?;
        db.import_topology(&topology)?;
    }

    let engine = Arc::new(FleetEngine::new(
        db.clone(),
        db.clone(),
        db.clone(),
        db.clone(),
        config.engine.clone(),
    ));

    let store: Arc<dyn TreeStore> = db.clone();
    monitor::spawn_monitor(
        store,
        engine.liveness().clone(),
        config.monitor.sweep_interval_secs,
    );
    monitor::spawn_retention(db.clone(), config.database.telemetry_retention_days);

    let app = api::router(AppState { engine })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("FluxION Fleet Server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
