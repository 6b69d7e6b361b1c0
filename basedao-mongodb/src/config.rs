//! Connection settings for the MongoDB backend.

use std::{env, fmt::Display, str::FromStr, time::Duration};

use mongodb::options::ClientOptions;
use serde::{Deserialize, Serialize};

use basedao_core::error::{DaoError, DaoResult};

pub const DEFAULT_URI: &str = "mongodb://127.0.0.1:27017";
pub const DEFAULT_DATABASE: &str = "default";

/// Client tuning applied on top of whatever the connection string sets.
///
/// Durations are whole seconds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub server_selection_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub heartbeat_freq_secs: u64,
    pub max_idle_time_secs: u64,
    pub retry_reads: bool,
    pub retry_writes: bool,
    /// Forces a direct connection. Only honored when the connection string names a single
    /// host; unset leaves the connection string in charge.
    pub direct_connection: Option<bool>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            max_pool_size: 10,
            min_pool_size: 1,
            server_selection_timeout_secs: 5,
            connect_timeout_secs: 10,
            heartbeat_freq_secs: 10,
            max_idle_time_secs: 60,
            retry_reads: true,
            retry_writes: true,
            direct_connection: None,
        }
    }
}

impl MongoConfig {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Reads `MONGODB_URI`, `MONGODB_DB_NAME` and the tuning variables
    /// (`MONGODB_MAX_POOL_SIZE`, `MONGODB_MIN_POOL_SIZE`,
    /// `MONGODB_SERVER_SELECTION_TIMEOUT_SECS`, `MONGODB_CONNECT_TIMEOUT_SECS`,
    /// `MONGODB_HEARTBEAT_FREQ_SECS`, `MONGODB_MAX_IDLE_TIME_SECS`, `MONGODB_RETRY_READS`,
    /// `MONGODB_RETRY_WRITES`, `MONGODB_DIRECT_CONNECTION`). Unset variables keep defaults.
    pub fn from_env() -> DaoResult<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> DaoResult<Self> {
        let defaults = MongoConfig::default();

        Ok(Self {
            uri: var("MONGODB_URI").unwrap_or(defaults.uri),
            database: var("MONGODB_DB_NAME").unwrap_or(defaults.database),
            max_pool_size: parse_var(&var, "MONGODB_MAX_POOL_SIZE")?.unwrap_or(defaults.max_pool_size),
            min_pool_size: parse_var(&var, "MONGODB_MIN_POOL_SIZE")?.unwrap_or(defaults.min_pool_size),
            server_selection_timeout_secs: parse_var(&var, "MONGODB_SERVER_SELECTION_TIMEOUT_SECS")?
                .unwrap_or(defaults.server_selection_timeout_secs),
            connect_timeout_secs: parse_var(&var, "MONGODB_CONNECT_TIMEOUT_SECS")?
                .unwrap_or(defaults.connect_timeout_secs),
            heartbeat_freq_secs: parse_var(&var, "MONGODB_HEARTBEAT_FREQ_SECS")?
                .unwrap_or(defaults.heartbeat_freq_secs),
            max_idle_time_secs: parse_var(&var, "MONGODB_MAX_IDLE_TIME_SECS")?
                .unwrap_or(defaults.max_idle_time_secs),
            retry_reads: parse_var(&var, "MONGODB_RETRY_READS")?.unwrap_or(defaults.retry_reads),
            retry_writes: parse_var(&var, "MONGODB_RETRY_WRITES")?.unwrap_or(defaults.retry_writes),
            direct_connection: parse_var(&var, "MONGODB_DIRECT_CONNECTION")?,
        })
    }

    pub(crate) fn apply(&self, options: &mut ClientOptions) {
        options.max_pool_size = Some(self.max_pool_size);
        options.min_pool_size = Some(self.min_pool_size);
        options.server_selection_timeout = Some(Duration::from_secs(self.server_selection_timeout_secs));
        options.connect_timeout = Some(Duration::from_secs(self.connect_timeout_secs));
        options.heartbeat_freq = Some(Duration::from_secs(self.heartbeat_freq_secs));
        options.max_idle_time = Some(Duration::from_secs(self.max_idle_time_secs));
        options.retry_reads = Some(self.retry_reads);
        options.retry_writes = Some(self.retry_writes);
        if options.hosts.len() == 1 {
            if let Some(direct) = self.direct_connection {
                options.direct_connection = Some(direct);
            }
        }
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> DaoResult<Option<T>>
where
    T::Err: Display,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| DaoError::Configuration(format!("{name}='{raw}': {e}")))
        })
        .transpose()
}
