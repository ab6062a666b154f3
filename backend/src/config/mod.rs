//! Runtime configuration from the environment.
//!
//! A `.env` file in the working directory is loaded first (if present).
//!
//! | Variable                        | Default                    |
//! |---------------------------------|----------------------------|
//! | `HREFLANG_DATA_DIR`             | `.hreflang`                |
//! | `HREFLANG_SITEMAP`              | `<data dir>/sitemap.json`  |
//! | `HREFLANG_SITE_LOCALE`          | `en_US`                    |
//! | `HREFLANG_FETCH_TIMEOUT_SECS`   | `30`                       |
//! | `HREFLANG_MAX_FEED_BYTES`       | `10485760`                 |
//! | `HREFLANG_IMPORT_INTERVAL_SECS` | `3600`                     |
//! | `HREFLANG_ADMIN_TOKEN`          | unset (admin writes off)   |
//! | `HREFLANG_PUBLIC_ORIGIN`        | `http://localhost:<port>`  |
//! | `HREFLANG_RUN_HISTORY`          | `20`                       |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::fetch::{DEFAULT_MAX_BYTES, DEFAULT_TIMEOUT_SECS};
use crate::import::DEFAULT_HISTORY;
use crate::models::LanguageCode;
use crate::store::DEFAULT_DATA_DIR;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Default scheduler period (hourly)
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

const DEFAULT_LOCALE: &str = "en_US";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub sitemap: PathBuf,
    pub site_locale: String,
    pub fetch_timeout: Duration,
    pub max_feed_bytes: usize,
    pub import_interval: Duration,
    pub admin_token: Option<String>,
    /// Origin admin form posts must come from. `None` means `http://localhost:<port>`.
    pub public_origin: Option<String>,
    pub run_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            sitemap: data_dir.join("sitemap.json"),
            data_dir,
            site_locale: DEFAULT_LOCALE.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_feed_bytes: DEFAULT_MAX_BYTES,
            import_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            admin_token: None,
            public_origin: None,
            run_history: DEFAULT_HISTORY,
        }
    }
}

impl Config {
    /// Load from the process environment (after `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let data_dir = var("HREFLANG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let sitemap = var("HREFLANG_SITEMAP")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("sitemap.json"));

        let fetch_timeout = parse_var::<u64>(&var, "HREFLANG_FETCH_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.fetch_timeout);
        let import_interval = parse_var::<u64>(&var, "HREFLANG_IMPORT_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.import_interval);

        if fetch_timeout.is_zero() {
            return Err(invalid("HREFLANG_FETCH_TIMEOUT_SECS", "must be greater than zero"));
        }
        if import_interval.is_zero() {
            return Err(invalid("HREFLANG_IMPORT_INTERVAL_SECS", "must be greater than zero"));
        }

        Ok(Self {
            data_dir,
            sitemap,
            site_locale: var("HREFLANG_SITE_LOCALE").unwrap_or(defaults.site_locale),
            fetch_timeout,
            max_feed_bytes: parse_var(&var, "HREFLANG_MAX_FEED_BYTES")?.unwrap_or(defaults.max_feed_bytes),
            import_interval,
            admin_token: var("HREFLANG_ADMIN_TOKEN"),
            public_origin: var("HREFLANG_PUBLIC_ORIGIN").map(|o| o.trim_end_matches('/').to_string()),
            run_history: parse_var(&var, "HREFLANG_RUN_HISTORY")?.unwrap_or(defaults.run_history),
        })
    }

    /// Site default language, from the locale (`en_US` -> `en`).
    pub fn default_language(&self) -> LanguageCode {
        LanguageCode::from_locale(&self.site_locale)
    }

    /// Origin for same-origin checks when serving on `port`.
    pub fn origin(&self, port: u16) -> String {
        self.public_origin
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", port))
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| raw.parse::<T>().map_err(|e| invalid(key, e.to_string())))
        .transpose()
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.into(),
    }
}
