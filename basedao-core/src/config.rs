//! Tuning knobs for the DAO.

use std::{env, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{DaoError, DaoResult},
    page::DEFAULT_PAGE_SIZE,
};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 8;
pub const DEFAULT_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// DAO configuration.
///
/// Deserializes with defaults for every missing field, so an empty table is a valid config.
///
/// # Example
///
/// ```ignore
/// use basedao::config::DaoConfig;
///
/// let config = DaoConfig::default().with_chunk_size(500);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DaoConfig {
    /// Largest window a single scan fetch may read.
    pub chunk_size: usize,
    /// Upper bound on scan fetches in flight at once.
    pub max_concurrent_chunks: usize,
    /// Page size used when a request does not name one.
    pub default_page_size: usize,
    /// `chrono` format string for `_add_time_str`.
    pub time_format: String,
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
            default_page_size: DEFAULT_PAGE_SIZE,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}

impl DaoConfig {
    /// Reads overrides from `BASEDAO_CHUNK_SIZE`, `BASEDAO_MAX_CONCURRENT_CHUNKS`,
    /// `BASEDAO_DEFAULT_PAGE_SIZE` and `BASEDAO_TIME_FORMAT`. Unset variables keep defaults.
    pub fn from_env() -> DaoResult<Self> {
        let defaults = DaoConfig::default();

        Ok(Self {
            chunk_size: env_or("BASEDAO_CHUNK_SIZE", defaults.chunk_size)?,
            max_concurrent_chunks: env_or(
                "BASEDAO_MAX_CONCURRENT_CHUNKS",
                defaults.max_concurrent_chunks,
            )?,
            default_page_size: env_or("BASEDAO_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            time_format: env::var("BASEDAO_TIME_FORMAT").unwrap_or(defaults.time_format),
        }
        .validated()?)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_concurrent_chunks(mut self, max_concurrent_chunks: usize) -> Self {
        self.max_concurrent_chunks = max_concurrent_chunks;
        self
    }

    pub fn with_default_page_size(mut self, default_page_size: usize) -> Self {
        self.default_page_size = default_page_size;
        self
    }

    pub fn with_time_format(mut self, time_format: impl Into<String>) -> Self {
        self.time_format = time_format.into();
        self
    }

    /// Rejects zero sizes, which would stall scans.
    pub fn validated(self) -> DaoResult<Self> {
        for (name, value) in [
            ("chunk_size", self.chunk_size),
            ("max_concurrent_chunks", self.max_concurrent_chunks),
            ("default_page_size", self.default_page_size),
        ] {
            if value == 0 {
                return Err(DaoError::Configuration(format!("{name} must be greater than zero")));
            }
        }

        Ok(self)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> DaoResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DaoError::Configuration(format!("{name}: {e}"))),
        Err(_) => Ok(default),
    }
}
