//! Process entry point: HTTP server + worker pool + repair sweep in one
//! process, coordinated by a single `CancellationToken` (§9, §10).

use anyhow::{Context, Result};
use codecell_core::config::Config;
use codecell_core::kernel::Kernel;
use codecell_core::repair_sweep::RepairSweep;
use codecell_core::server::build_app;
use codecell_core::service::Service;
use codecell_core::worker::WorkerPool;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},sqlx=warn", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting codecell");

    if config.broker_url.is_some() {
        tracing::warn!("BROKER_URL is set but unused - the ephemeral store and job queue are Postgres-backed (§6)");
    }

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("migrations complete");

    let concurrency = config.max_concurrent_executions;
    let http_port = config.http_port;
    let kernel = Kernel::new(config, pool);

    kernel
        .seed_languages()
        .await
        .context("failed to seed languages table from the runtime catalogue")?;
    tracing::info!("runtime catalogue seeded into the languages table");

    let shutdown = CancellationToken::new();
    let services: Vec<Box<dyn Service>> = vec![
        Box::new(WorkerPool::new(kernel.clone(), concurrency)),
        Box::new(RepairSweep::new(kernel.clone())),
    ];

    let mut handles = Vec::new();
    for service in services {
        let name = service.name().to_string();
        let shutdown = shutdown.clone();
        handles.push((
            name.clone(),
            tokio::spawn(async move {
                if let Err(err) = service.run(shutdown).await {
                    tracing::error!(service = %name, error = %err, "background service exited with error");
                }
            }),
        ));
    }

    let app = build_app(kernel);
    run_http_server(app, http_port, shutdown.clone()).await?;

    tracing::info!("HTTP server stopped, signaling background services to shut down");
    shutdown.cancel();

    for (name, handle) in handles {
        if let Err(err) = handle.await {
            tracing::error!(service = %name, error = %err, "background service task panicked");
        }
    }

    Ok(())
}

async fn run_http_server(app: axum::Router, port: u16, shutdown: CancellationToken) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind HTTP listener")?;
    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
