use std::{env, num::NonZeroUsize, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::pipeline::cast::EmptyCastPolicy;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

const DEFAULT_GENDER_API_URL: &str = "https://innovaapi.aminer.cn/tools/v1/predict/gender";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    db_dsn: String,
    input_path: PathBuf,
    check_duplicates: bool,
    gender_api_url: String,
    gender_api_connect_timeout: Duration,
    gender_api_total_timeout: Duration,
    lookup_concurrency: NonZeroUsize,
    empty_cast_policy: EmptyCastPolicy,
    db_max_connections: u32,
    db_acquire_timeout: Duration,
    metrics_textfile_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Reads the loader configuration from the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when `CATALOG_DB_DSN` is unset or any value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_dsn = env_var("CATALOG_DB_DSN")?;
        let input_path = PathBuf::from(
            env::var("CATALOG_INPUT_PATH")
                .unwrap_or_else(|_| "input_data/netflix_titles.csv".to_string()),
        );
        let check_duplicates = parse_bool("CATALOG_CHECK_DUPLICATES", true)?;

        // Gender lookup service
        let gender_api_url =
            env::var("GENDER_API_URL").unwrap_or_else(|_| DEFAULT_GENDER_API_URL.to_string());
        reqwest::Url::parse(&gender_api_url).map_err(|error| ConfigError::Invalid {
            name: "GENDER_API_URL",
            source: anyhow::Error::new(error),
        })?;
        let gender_api_connect_timeout = parse_duration_ms("GENDER_API_CONNECT_TIMEOUT_MS", 3000)?;
        let gender_api_total_timeout = parse_duration_ms("GENDER_API_TOTAL_TIMEOUT_MS", 10000)?;
        let lookup_concurrency = parse_concurrency("GENDER_LOOKUP_CONCURRENCY", 100)?;
        let empty_cast_policy = parse_empty_cast_policy("EMPTY_CAST_POLICY")?;

        // Database connection pool settings
        let db_max_connections = parse_u32("CATALOG_DB_MAX_CONNECTIONS", 5)?;
        let db_acquire_timeout = parse_duration_secs("CATALOG_DB_ACQUIRE_TIMEOUT_SECS", 30)?;

        let metrics_textfile_path = env::var("METRICS_TEXTFILE_PATH")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            db_dsn,
            input_path,
            check_duplicates,
            gender_api_url,
            gender_api_connect_timeout,
            gender_api_total_timeout,
            lookup_concurrency,
            empty_cast_policy,
            db_max_connections,
            db_acquire_timeout,
            metrics_textfile_path,
        })
    }

    #[must_use]
    pub fn db_dsn(&self) -> &str {
        &self.db_dsn
    }

    #[must_use]
    pub fn input_path(&self) -> &std::path::Path {
        &self.input_path
    }

    #[must_use]
    pub fn check_duplicates(&self) -> bool {
        self.check_duplicates
    }

    #[must_use]
    pub fn gender_api_url(&self) -> &str {
        &self.gender_api_url
    }

    #[must_use]
    pub fn gender_api_connect_timeout(&self) -> Duration {
        self.gender_api_connect_timeout
    }

    #[must_use]
    pub fn gender_api_total_timeout(&self) -> Duration {
        self.gender_api_total_timeout
    }

    #[must_use]
    pub fn lookup_concurrency(&self) -> NonZeroUsize {
        self.lookup_concurrency
    }

    #[must_use]
    pub fn empty_cast_policy(&self) -> EmptyCastPolicy {
        self.empty_cast_policy
    }

    #[must_use]
    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    #[must_use]
    pub fn db_acquire_timeout(&self) -> Duration {
        self.db_acquire_timeout
    }

    #[must_use]
    pub fn metrics_textfile_path(&self) -> Option<&std::path::Path> {
        self.metrics_textfile_path.as_deref()
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_concurrency(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<i64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    usize::try_from(parsed)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("must be at least 1, got {parsed}"),
        })
}

fn parse_empty_cast_policy(name: &'static str) -> Result<EmptyCastPolicy, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(EmptyCastPolicy::default()),
        Ok(raw) => raw.parse().map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::Error::msg(error),
        }),
    }
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(value))
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}
