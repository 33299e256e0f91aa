//! Konfiguration über Umgebungsvariablen
//!
//! | Variable                               | Default                   |
//! |----------------------------------------|---------------------------|
//! | `BREATHBOUND_DB_PATH`                  | App-Datenverzeichnis      |
//! | `BREATHBOUND_CONNECT_DELAY_MS`         | 2000                      |
//! | `BREATHBOUND_REMOTE_PREVIEW_DELAY_MS`  | 1000                      |
//! | `BREATHBOUND_TICK_MS`                  | 1000                      |

use crate::call_session::SessionTimings;
use crate::directory::{DirectoryError, SqliteDirectory};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid number for {var}: '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Could not resolve database path: {0}")]
    DatabasePath(#[from] DirectoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub timings: SessionTimings,
}

impl AppConfig {
    /// Liest die Konfiguration aus der Prozessumgebung
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = match lookup("BREATHBOUND_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => SqliteDirectory::default_path()?,
        };

        let defaults = SessionTimings::default();
        let millis = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(var) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidNumber { var, value }),
                None => Ok(default),
            }
        };

        let timings = SessionTimings {
            connect_delay: millis("BREATHBOUND_CONNECT_DELAY_MS", defaults.connect_delay)?,
            remote_preview_delay: millis(
                "BREATHBOUND_REMOTE_PREVIEW_DELAY_MS",
                defaults.remote_preview_delay,
            )?,
            tick_period: millis("BREATHBOUND_TICK_MS", defaults.tick_period)?,
        };

        // tokio::time::interval akzeptiert keine Periode von 0
        if timings.tick_period.is_zero() {
            return Err(ConfigError::InvalidNumber {
                var: "BREATHBOUND_TICK_MS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_path,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BREATHBOUND_DB_PATH", "/tmp/bb.db"),
            ("BREATHBOUND_CONNECT_DELAY_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/bb.db"));
        assert_eq!(config.timings.connect_delay, Duration::from_millis(250));
        assert_eq!(config.timings.tick_period, Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_garbage() {
        let result = AppConfig::from_lookup(lookup(&[
            ("BREATHBOUND_DB_PATH", "/tmp/bb.db"),
            ("BREATHBOUND_TICK_MS", "soon"),
        ]));

        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber {
                var: "BREATHBOUND_TICK_MS",
                ..
            })
        ));
    }
}
