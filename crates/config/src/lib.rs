use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "flock.toml",
    "config/flock.toml",
    "crates/config/flock.toml",
    "../flock.toml",
    "../config/flock.toml",
    "../crates/config/flock.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub invites: InviteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://flock.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
    #[serde(default)]
    pub google: GoogleAuthConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
            google: GoogleAuthConfig::default(),
        }
    }
}

impl AuthConfig {
    fn default_session_ttl() -> u64 {
        86_400
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoogleAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Settings for the leader invite workflow.
///
/// ```
/// use flock_config::InviteConfig;
///
/// let invites = InviteConfig::default();
/// assert_eq!(invites.default_ttl_hours, 168);
/// assert_eq!(invites.sweep_interval_seconds, 300);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteConfig {
    #[serde(default = "InviteConfig::default_ttl_hours")]
    pub default_ttl_hours: u32,
    #[serde(default = "InviteConfig::default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl InviteConfig {
    const fn default_ttl_hours() -> u32 {
        168
    }

    const fn default_sweep_interval() -> u64 {
        300
    }
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: Self::default_ttl_hours(),
            sweep_interval_seconds: Self::default_sweep_interval(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use flock_config::load;
///
/// std::env::remove_var("FLOCK_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    load_from(None)
}

/// Like [`load`], but an explicit `path` takes precedence over `FLOCK_CONFIG`
/// and the files searched in the working directory.
pub fn load_from(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let session_ttl = i64::try_from(defaults.auth.session_ttl_seconds).unwrap_or(i64::MAX);
    let sweep_interval =
        i64::try_from(defaults.invites.sweep_interval_seconds).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.session_ttl_seconds", session_ttl)?
        .set_default(
            "invites.default_ttl_hours",
            i64::from(defaults.invites.default_ttl_hours),
        )?
        .set_default("invites.sweep_interval_seconds", sweep_interval)?;

    let environment_overrides = config::Environment::with_prefix("FLOCK").separator("__");

    let mut config_file_attached = false;

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path.to_path_buf()));
        config_file_attached = true;
        debug!(path = %path.display(), "loading configuration from command line");
    } else if let Ok(path) = std::env::var("FLOCK_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via FLOCK_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    if config.invites.default_ttl_hours == 0 {
        config.invites.default_ttl_hours = InviteConfig::default_ttl_hours();
    }

    debug!(?config, "loaded backend configuration");
    Ok(config)
}
