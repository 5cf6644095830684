use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use flock_auth::Authenticator;
use flock_config::{AppConfig, InviteConfig};
use flock_database::initialize_database;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_target(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub invites: InviteConfig,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database).await?;
        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());

        info!(
            google_oauth = authenticator.google_enabled(),
            invite_ttl_hours = config.invites.default_ttl_hours,
            "backend services ready"
        );

        Ok(Self {
            db_pool,
            authenticator,
            invites: config.invites.clone(),
        })
    }
}

/// Run `job` every `period` until the returned handle is aborted.
///
/// Failures are logged and the loop keeps going; the first run happens
/// one full period after spawning.
pub fn spawn_periodic<F, Fut, T, E>(name: &'static str, period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
    T: std::fmt::Debug,
    E: std::fmt::Display,
{
    let period = period.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match job().await {
                Ok(outcome) => tracing::debug!(task = name, ?outcome, "periodic task finished"),
                Err(error) => warn!(task = name, %error, "periodic task failed"),
            }
        }
    })
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
