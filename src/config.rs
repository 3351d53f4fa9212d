use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;

/// Application-level constants
pub const APP_NAME: &str = "MedOffice";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DB_FILE_NAME: &str = "medoffice.db";
pub const MEDIA_DIR_NAME: &str = "media";

const DEFAULT_BIND: &str = "127.0.0.1:8000";
const DEFAULT_ACCESS_TTL_MINUTES: i64 = 5;
const DEFAULT_REFRESH_TTL_HOURS: i64 = 24;
const DEFAULT_MAX_UPLOAD_MB: usize = 20;
const MAX_TTL_DAYS: i64 = 3650;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
    #[error("Cannot determine home directory; set MEDOFFICE_DATA_DIR")]
    NoHomeDir,
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "medoffice=info,tower_http=info,warn"
}

/// ~/MedOffice/ unless overridden.
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

/// Runtime settings, read from `MEDOFFICE_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    /// `None` means a random per-process secret.
    pub secret: Option<String>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("MEDOFFICE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                var: "MEDOFFICE_BIND",
                value: bind_raw.clone(),
            })?;

        let data_dir = match lookup("MEDOFFICE_DATA_DIR").filter(|s| !s.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => app_data_dir()?,
        };

        let secret = lookup("MEDOFFICE_SECRET").filter(|s| !s.is_empty());

        let access_minutes =
            parse_positive(&lookup, "MEDOFFICE_ACCESS_TTL_MINUTES", DEFAULT_ACCESS_TTL_MINUTES)?;
        let refresh_hours =
            parse_positive(&lookup, "MEDOFFICE_REFRESH_TTL_HOURS", DEFAULT_REFRESH_TTL_HOURS)?;
        let upload_mb = parse_positive(&lookup, "MEDOFFICE_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB as i64)?;

        let access_ttl = bounded_ttl(
            "MEDOFFICE_ACCESS_TTL_MINUTES",
            access_minutes,
            Duration::try_minutes(access_minutes),
        )?;
        let refresh_ttl = bounded_ttl(
            "MEDOFFICE_REFRESH_TTL_HOURS",
            refresh_hours,
            Duration::try_hours(refresh_hours),
        )?;
        let max_upload_bytes = usize::try_from(upload_mb)
            .ok()
            .and_then(|mb| mb.checked_mul(1024 * 1024))
            .ok_or_else(|| ConfigError::InvalidValue {
                var: "MEDOFFICE_MAX_UPLOAD_MB",
                value: upload_mb.to_string(),
            })?;

        Ok(Self {
            bind,
            data_dir,
            secret,
            access_ttl,
            refresh_ttl,
            max_upload_bytes,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join(MEDIA_DIR_NAME)
    }
}

/// Token lifetimes are capped so `now + ttl` always fits a timestamp.
fn bounded_ttl(var: &'static str, amount: i64, ttl: Option<Duration>) -> Result<Duration, ConfigError> {
    ttl.filter(|ttl| *ttl <= Duration::days(MAX_TTL_DAYS))
        .ok_or_else(|| ConfigError::InvalidValue {
            var,
            value: amount.to_string(),
        })
}

fn parse_positive<F>(lookup: &F, var: &'static str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue { var, value: raw }),
    }
}
