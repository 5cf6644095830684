use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use flock_api::{build_router, sweep_expired_invites, AppState};
use flock_config::{load_from, AppConfig};
use flock_runtime::{shutdown_signal, spawn_periodic, telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "flock-backend")]
#[command(about = "Flock church membership backend")]
struct Cli {
    /// Configuration file; overrides FLOCK_CONFIG and the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Expire overdue admin invites once and exit
    SweepInvites,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_from(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::Migrate => migrate(config).await,
        Commands::SweepInvites => sweep_invites(config).await,
    }
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    info!("starting Flock backend");

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let sweep_pool = services.db_pool.clone();
    let sweeper = spawn_periodic(
        "invite-expiry",
        Duration::from_secs(config.invites.sweep_interval_seconds),
        move || {
            let pool = sweep_pool.clone();
            async move { sweep_expired_invites(&pool).await }
        },
    );

    let state = AppState::new(
        services.db_pool.clone(),
        services.authenticator.clone(),
        services.invites.clone(),
    );
    let app = build_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    sweeper.abort();
    info!("backend shut down");
    Ok(())
}

async fn migrate(config: AppConfig) -> anyhow::Result<()> {
    BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    info!(database = %config.database.url, "migrations applied");
    Ok(())
}

async fn sweep_invites(config: AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    let expired = sweep_expired_invites(&services.db_pool).await?;
    println!("expired {expired} invite(s)");
    Ok(())
}
