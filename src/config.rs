//! Runtime configuration, read from the environment.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_PATH: &str = "sqlite:aquahealth.db?mode=rwc";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

/// Knobs of the health engine itself.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Trailing window for tests and tasks, in days.
    pub window_days: i64,

    /// Maximum number of tests considered.
    pub max_tests: usize,

    /// How long a cached result stays fresh.
    pub cache_ttl: Duration,

    /// Upper bound on the whole four-way fetch.
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            max_tests: 10,
            cache_ttl: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Where records are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Sqlite { database_url: String },
    Rest { base_url: String, api_key: Option<String> },
}

/// Top-level configuration for the server binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub provider: ProviderConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load configuration from `AQUAHEALTH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_var(&lookup, "AQUAHEALTH_PORT")?.unwrap_or(DEFAULT_PORT);

        let provider = match lookup("AQUAHEALTH_BACKEND_URL").filter(|u| !u.trim().is_empty()) {
            Some(base_url) => ProviderConfig::Rest {
                base_url,
                api_key: lookup("AQUAHEALTH_BACKEND_KEY"),
            },
            None => ProviderConfig::Sqlite {
                database_url: lookup("AQUAHEALTH_DATABASE_URL")
                    .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            },
        };

        let mut engine = EngineConfig::default();
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AQUAHEALTH_CACHE_TTL_SECS")? {
            engine.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AQUAHEALTH_FETCH_TIMEOUT_SECS")? {
            engine.fetch_timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            port,
            provider,
            engine,
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}
