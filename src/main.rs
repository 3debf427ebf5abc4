// =============================================================================
// Matrixon Relations - Main Entry Point
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// License: Apache 2.0 / MIT
//
// Description:
//   Entry point of the matrixon-relations service. Loads the configuration,
//   installs the tracing subscriber, opens the SQLite database and serves the
//   relations client API until Ctrl-C.
//
// Runtime Requirements:
//   • MATRIXON_CONFIG or --config pointing to a TOML config file
//   • A writable location for the SQLite database file
//
// =============================================================================

use std::{process, sync::Arc, time::Instant};

use axum::extract::DefaultBodyLimit;
use matrixon_db::Database;
use matrixon_relations::{api, Config, Result, Services};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

mod clap;

#[tokio::main]
async fn main() {
    let args = clap::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("It looks like your config is invalid. The following error occurred: {e}");
            process::exit(1);
        }
    };

    init_tracing(args.log_level.as_deref().unwrap_or(&config.log));

    let result = match args.command {
        clap::Commands::Start { address, port } => {
            if let Some(address) = address {
                match address.parse() {
                    Ok(address) => {
                        config.address = address;
                        info!("📡 Address override from CLI: {}", config.address);
                    }
                    Err(_) => {
                        error!("❌ Invalid address format: {}", address);
                        process::exit(1);
                    }
                }
            }
            if let Some(port) = port {
                config.port = port;
                info!("🔌 Port override from CLI: {}", config.port);
            }

            run_server(config).await
        }
        clap::Commands::Migrate => migrate(config).await,
    };

    if let Err(e) = result {
        error!("❌ {}", e);
        process::exit(1);
    }
}

fn init_tracing(filter: &str) {
    let filter_layer = match EnvFilter::try_new(filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("It looks like your log filter is invalid ({e}), falling back to `warn`");
            EnvFilter::new("warn")
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn migrate(config: Config) -> Result<()> {
    let start = Instant::now();
    info!("🗄️ Migrating {}", config.database.url);

    let db = Database::load_or_create(config.database).await?;
    db.close().await;

    info!("✅ Migrations applied in {:?}", start.elapsed());
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let start = Instant::now();
    info!("🚀 Starting Matrixon Relations for {}", config.server_name);

    if config.metrics.enabled {
        match PrometheusBuilder::new()
            .with_http_listener(config.metrics.address)
            .install()
        {
            Ok(()) => info!("📊 Prometheus exporter listening on {}", config.metrics.address),
            Err(e) => warn!("⚠️ Failed to install Prometheus exporter: {}", e),
        }
    }

    if config.database.is_in_memory() {
        warn!("⚠️ Using an in-memory database, nothing will survive a restart");
    }

    let db = Arc::new(Database::load_or_create(config.database.clone()).await?);
    if !db.health_check().await? {
        error!("❌ Database health check failed");
    }

    let address = config.listen_address();
    let max_request_size = config.max_request_size;
    let services = Services::build(db.clone(), config);

    let app = api::router(services).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max(max_request_size)),
    );

    let listener = TcpListener::bind(address).await?;
    info!(
        "✅ Listening on {} (started in {:?})",
        address,
        start.elapsed()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("✅ Server shutdown completed");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("🛑 Received Ctrl-C, shutting down"),
        Err(e) => error!("❌ Failed to listen for Ctrl-C: {}", e),
    }
}
