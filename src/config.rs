// ABOUTME: Environment-driven configuration for the server, database, media, and accounts
// ABOUTME: Every setting has a logged default so a bare environment still boots

use anyhow::{Context, Result};
use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub media_root: PathBuf,
    pub media_url: String,
    pub min_password_length: usize,
    pub max_upload_bytes: usize,
    pub db_connect_attempts: u32,
    pub db_retry_delay: Duration,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_url: "sqlite:recipes.db?mode=rwc".to_string(),
            media_root: PathBuf::from("media"),
            media_url: "/media".to_string(),
            min_password_length: 5,
            max_upload_bytes: 10 * 1024 * 1024,
            db_connect_attempts: 30,
            db_retry_delay: Duration::from_secs(1),
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let media_url: String = try_load("MEDIA_URL", &defaults.media_url)?;
        let media_url = media_url.trim_end_matches('/').to_string();
        if !media_url.starts_with('/') {
            anyhow::bail!("MEDIA_URL must be an absolute path below the root, got {media_url:?}");
        }

        Ok(Self {
            host: try_load("HOST", &defaults.host)?,
            port: try_load("PORT", &defaults.port.to_string())?,
            database_url: try_load("DATABASE_URL", &defaults.database_url)?,
            media_root: try_load("MEDIA_ROOT", &defaults.media_root.display().to_string())?,
            media_url,
            min_password_length: try_load(
                "MIN_PASSWORD_LENGTH",
                &defaults.min_password_length.to_string(),
            )?,
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", &defaults.max_upload_bytes.to_string())?,
            db_connect_attempts: try_load(
                "DB_CONNECT_ATTEMPTS",
                &defaults.db_connect_attempts.to_string(),
            )?,
            db_retry_delay: Duration::from_millis(try_load(
                "DB_RETRY_DELAY_MS",
                &defaults.db_retry_delay.as_millis().to_string(),
            )?),
            admin_email: optional("ADMIN_EMAIL"),
            admin_password: optional("ADMIN_PASSWORD"),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow::anyhow!("{e}")
        })
        .with_context(|| format!("Environment misconfigured: {key}={raw}"))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
