//! Runtime configuration, read from `CYBERGUARD_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
pub const DEFAULT_DB_PATH: &str = "sqlite:cyberguard.db?mode=rwc";
pub const DEFAULT_FEED_CAPACITY: usize = 256;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,

    /// Base URL of the detection backend
    pub backend_url: String,

    /// Report archive database
    pub database_url: String,

    /// Extra directory searched first for PDF fonts
    pub fonts_dir: Option<PathBuf>,

    /// Display offset for timestamps in reports, in minutes east of UTC
    pub utc_offset_minutes: i32,

    /// Bound of the live feed's message queue
    pub feed_capacity: usize,

    /// Per-request timeout for the detection backend
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup. Unset or unparseable
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            port: lookup("CYBERGUARD_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),

            backend_url: lookup("CYBERGUARD_BACKEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),

            database_url: lookup("CYBERGUARD_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),

            fonts_dir: lookup("CYBERGUARD_FONTS_DIR")
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),

            utc_offset_minutes: lookup("CYBERGUARD_UTC_OFFSET_MINUTES")
                .and_then(|m| m.parse().ok())
                .filter(|m: &i32| m.abs() < 24 * 60)
                .unwrap_or(0),

            feed_capacity: lookup("CYBERGUARD_FEED_CAPACITY")
                .and_then(|c| c.parse().ok())
                .filter(|c: &usize| *c > 0)
                .unwrap_or(DEFAULT_FEED_CAPACITY),

            http_timeout: Duration::from_secs(
                lookup("CYBERGUARD_HTTP_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
        }
    }

    /// The display offset for report timestamps.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.database_url, DEFAULT_DB_PATH);
        assert!(config.fonts_dir.is_none());
        assert_eq!(config.feed_capacity, DEFAULT_FEED_CAPACITY);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("CYBERGUARD_PORT", "8088"),
            ("CYBERGUARD_BACKEND_URL", "http://detector:5000/"),
            ("CYBERGUARD_FONTS_DIR", "/opt/fonts"),
            ("CYBERGUARD_UTC_OFFSET_MINUTES", "-300"),
            ("CYBERGUARD_FEED_CAPACITY", "16"),
        ]);

        assert_eq!(config.port, 8088);
        assert_eq!(config.backend_url, "http://detector:5000");
        assert_eq!(config.fonts_dir, Some(PathBuf::from("/opt/fonts")));
        assert_eq!(config.utc_offset().local_minus_utc(), -300 * 60);
        assert_eq!(config.feed_capacity, 16);
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = config(&[
            ("CYBERGUARD_PORT", "http"),
            ("CYBERGUARD_UTC_OFFSET_MINUTES", "99999"),
            ("CYBERGUARD_FEED_CAPACITY", "0"),
        ]);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.utc_offset_minutes, 0);
        assert_eq!(config.feed_capacity, DEFAULT_FEED_CAPACITY);
    }
}
