use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::*;

/// Site configuration, read once at startup from the environment (and `.env`)
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub secondary_database_url: String,
    pub media_root: PathBuf,
    pub template_dir: PathBuf,
    pub session_secret: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub login_required: bool,
}

const DEFAULT_SECRET: &str = "insecure-development-secret-change-me-please";

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let session_secret: String = try_load("SESSION_SECRET", DEFAULT_SECRET)?;
        if session_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                key: "SESSION_SECRET",
                reason: "must be at least 32 bytes".into(),
            });
        }
        if session_secret == DEFAULT_SECRET {
            warn!("SESSION_SECRET is the development default, do not deploy this");
        }

        Ok(Self {
            bind_address: try_load("BIND_ADDRESS", "127.0.0.1:8000")?,
            database_url: try_load("DATABASE_URL", "sqlite://db.sqlite3")?,
            secondary_database_url: try_load("SECONDARY_DATABASE_URL", "sqlite://secondary.sqlite3")?,
            media_root: try_load("MEDIA_ROOT", "media")?,
            template_dir: try_load("TEMPLATE_DIR", concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))?,
            session_secret,
            smtp_host: try_load("SMTP_HOST", "localhost")?,
            smtp_port: try_load("SMTP_PORT", "25")?,
            login_required: try_load("LOGIN_REQUIRED", "false")?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        debug!("{} not set, using default: {}", key, default);
        default.to_string()
    });

    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
