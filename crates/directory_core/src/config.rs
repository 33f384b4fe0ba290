//! Runtime settings loaded from environment variables.
//!
//! # Responsibility
//! - Resolve database, upload, logging and photo-limit settings once at startup.
//! - Reject malformed values with actionable errors instead of guessing.
//!
//! Variables:
//! - `DIRECTORY_DB_PATH` (default `directory.sqlite3`)
//! - `UPLOAD_DIR` (default `uploads`)
//! - `PUBLIC_BASE_URL`, falling back to `BACKEND_URL` (default empty)
//! - `LOG_LEVEL` (default per build mode), `LOG_DIR` (optional, absolute)
//! - `PHOTO_MAX_BYTES` (default 5 MiB)

use crate::logging::{default_log_level, parse_level};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "directory.sqlite3";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_PHOTO_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Configuration error with the offending variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}=`{value}`: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Resolved directory settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    /// Without trailing slash; empty means relative `/uploads/...` URLs.
    pub public_base_url: String,
    pub log_level: &'static str,
    pub log_dir: Option<PathBuf>,
    pub photo_max_bytes: usize,
}

impl DirectoryConfig {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let log_level = match get("LOG_LEVEL") {
            Some(value) => parse_level(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: "LOG_LEVEL",
                value: value.clone(),
                reason: "expected trace|debug|info|warn|error".to_string(),
            })?,
            None => default_log_level(),
        };

        let log_dir = match get("LOG_DIR") {
            Some(value) => {
                let path = PathBuf::from(value.trim());
                if !path.is_absolute() {
                    return Err(ConfigError::InvalidValue {
                        key: "LOG_DIR",
                        value,
                        reason: "must be an absolute path".to_string(),
                    });
                }
                Some(path)
            }
            None => None,
        };

        let photo_max_bytes = match get("PHOTO_MAX_BYTES") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "PHOTO_MAX_BYTES",
                        value,
                        reason: "expected a positive byte count".to_string(),
                    });
                }
                Ok(parsed) => parsed,
            },
            None => DEFAULT_PHOTO_MAX_BYTES,
        };

        let public_base_url = get("PUBLIC_BASE_URL")
            .or_else(|| get("BACKEND_URL"))
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .unwrap_or_default();

        Ok(Self {
            db_path: get("DIRECTORY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            public_base_url,
            log_level,
            log_dir,
            photo_max_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DirectoryConfig, DEFAULT_PHOTO_MAX_BYTES};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn load(pairs: &[(&str, &str)]) -> Result<DirectoryConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        DirectoryConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("directory.sqlite3"));
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.public_base_url, "");
        assert_eq!(config.log_dir, None);
        assert_eq!(config.photo_max_bytes, DEFAULT_PHOTO_MAX_BYTES);
    }

    #[test]
    fn public_base_url_falls_back_and_drops_trailing_slash() {
        let config = load(&[("BACKEND_URL", "https://api.example.com/")]).unwrap();
        assert_eq!(config.public_base_url, "https://api.example.com");

        let config = load(&[
            ("PUBLIC_BASE_URL", "https://cdn.example.com"),
            ("BACKEND_URL", "https://api.example.com"),
        ])
        .unwrap();
        assert_eq!(config.public_base_url, "https://cdn.example.com");
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = load(&[("LOG_LEVEL", "loud")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "LOG_LEVEL", .. }));

        let err = load(&[("LOG_DIR", "relative/logs")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "LOG_DIR", .. }));

        let err = load(&[("PHOTO_MAX_BYTES", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "PHOTO_MAX_BYTES",
                ..
            }
        ));
    }

    #[test]
    fn level_is_normalized() {
        let config = load(&[("LOG_LEVEL", " WARNING ")]).unwrap();
        assert_eq!(config.log_level, "warn");
    }
}
