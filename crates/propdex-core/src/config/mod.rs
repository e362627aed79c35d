use std::time::Duration;

use crate::models::LoggerId;

mod env;

use env::{read_env_i32, read_env_u64, read_env_usize};

const ENV_UPDATE_INTERVAL_MS: &str = "PROPDEX_UPDATE_INTERVAL_MS";
const ENV_MAX_CHANGES_PER_UPDATE: &str = "PROPDEX_MAX_CHANGES_PER_UPDATE";
const ENV_LOGGER_TYPE: &str = "PROPDEX_LOGGER_TYPE";
const ENV_LOGGER_ID: &str = "PROPDEX_LOGGER_ID";
const ENV_CHECK_ERROR_LIMIT: &str = "PROPDEX_CHECK_ERROR_LIMIT";
const ENV_CHECK_PROGRESS_INTERVAL: &str = "PROPDEX_CHECK_PROGRESS_INTERVAL";
const ENV_FILTER_CACHE_SIZE: &str = "PROPDEX_FILTER_CACHE_SIZE";
const ENV_FILTER_CACHE_TTL_SECS: &str = "PROPDEX_FILTER_CACHE_TTL_SECS";

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CHANGES_PER_UPDATE: usize = 40_000;
pub const DEFAULT_CHECK_ERROR_LIMIT: usize = 10_000;
pub const DEFAULT_CHECK_PROGRESS_INTERVAL: usize = 10_000;
pub const DEFAULT_FILTER_CACHE_SIZE: usize = 100;
pub const DEFAULT_FILTER_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdaterConfig {
    pub interval: Duration,
    pub max_changes_per_update: usize,
    pub logger: LoggerId,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_UPDATE_INTERVAL,
            max_changes_per_update: DEFAULT_MAX_CHANGES_PER_UPDATE,
            logger: LoggerId::new(1, 1),
        }
    }
}

impl UpdaterConfig {
    #[must_use]
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: Duration::from_millis(read_env_u64(
                ENV_UPDATE_INTERVAL_MS,
                u64::try_from(DEFAULT_UPDATE_INTERVAL.as_millis()).unwrap_or(5_000),
                1,
            )),
            max_changes_per_update: read_env_usize(
                ENV_MAX_CHANGES_PER_UPDATE,
                DEFAULT_MAX_CHANGES_PER_UPDATE,
                1,
            ),
            logger: LoggerId::new(
                read_env_i32(ENV_LOGGER_TYPE, defaults.logger.logger_type),
                read_env_i32(ENV_LOGGER_ID, defaults.logger.logger_id),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckConfig {
    pub error_limit: usize,
    pub progress_interval: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            error_limit: DEFAULT_CHECK_ERROR_LIMIT,
            progress_interval: DEFAULT_CHECK_PROGRESS_INTERVAL,
        }
    }
}

impl CheckConfig {
    #[must_use]
    fn from_env() -> Self {
        Self {
            error_limit: read_env_usize(ENV_CHECK_ERROR_LIMIT, DEFAULT_CHECK_ERROR_LIMIT, 1),
            progress_interval: read_env_usize(
                ENV_CHECK_PROGRESS_INTERVAL,
                DEFAULT_CHECK_PROGRESS_INTERVAL,
                1,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterCacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for FilterCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_FILTER_CACHE_SIZE,
            ttl: DEFAULT_FILTER_CACHE_TTL,
        }
    }
}

impl FilterCacheConfig {
    #[must_use]
    fn from_env() -> Self {
        Self {
            max_entries: read_env_usize(ENV_FILTER_CACHE_SIZE, DEFAULT_FILTER_CACHE_SIZE, 1),
            ttl: Duration::from_secs(read_env_u64(
                ENV_FILTER_CACHE_TTL_SECS,
                DEFAULT_FILTER_CACHE_TTL.as_secs(),
                1,
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub updater: UpdaterConfig,
    pub check: CheckConfig,
    pub filter_cache: FilterCacheConfig,
}

impl AppConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            updater: UpdaterConfig::from_env(),
            check: CheckConfig::from_env(),
            filter_cache: FilterCacheConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::env::parse_usize_at_least;
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.updater.interval, Duration::from_secs(5));
        assert_eq!(config.updater.max_changes_per_update, 40_000);
        assert_eq!(config.check.error_limit, 10_000);
        assert_eq!(config.check.progress_interval, 10_000);
        assert_eq!(config.filter_cache.max_entries, 100);
        assert_eq!(config.filter_cache.ttl, Duration::from_secs(60));
    }

    #[test]
    fn usize_parsing_enforces_minimum_and_trims() {
        assert_eq!(parse_usize_at_least(Some(" 25 "), 10, 1), 25);
        assert_eq!(parse_usize_at_least(Some("0"), 10, 1), 10);
        assert_eq!(parse_usize_at_least(Some("abc"), 10, 1), 10);
        assert_eq!(parse_usize_at_least(None, 10, 1), 10);
    }
}
