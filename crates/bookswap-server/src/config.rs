// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Bookswap server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// HMAC secret used to sign and verify access tokens
    pub jwt_secret: String,
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Lifetime of issued access tokens, in hours
    pub token_ttl_hours: i64,
    /// Directory uploaded cover images are written to
    pub images_dir: PathBuf,
    /// Database pool size
    pub db_max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `BOOKSWAP_DATABASE_URL`: PostgreSQL or SQLite connection string
    /// - `BOOKSWAP_JWT_SECRET`: access token signing secret
    ///
    /// Optional (with defaults):
    /// - `BOOKSWAP_HTTP_PORT`: HTTP port (default: 8000)
    /// - `BOOKSWAP_TOKEN_TTL_HOURS`: token lifetime (default: 24)
    /// - `BOOKSWAP_IMAGES_DIR`: image directory (default: .data/imgs)
    /// - `BOOKSWAP_DB_MAX_CONNECTIONS`: pool size (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("BOOKSWAP_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("BOOKSWAP_DATABASE_URL"))?;

        let jwt_secret = std::env::var("BOOKSWAP_JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("BOOKSWAP_JWT_SECRET"))?;

        let http_port: u16 = std::env::var("BOOKSWAP_HTTP_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("BOOKSWAP_HTTP_PORT", "must be a valid port number")
            })?;

        let token_ttl_hours: i64 = std::env::var("BOOKSWAP_TOKEN_TTL_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse()
            .ok()
            .filter(|h| *h > 0)
            .ok_or(ConfigError::Invalid(
                "BOOKSWAP_TOKEN_TTL_HOURS",
                "must be a positive integer",
            ))?;

        let images_dir = std::env::var("BOOKSWAP_IMAGES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".data/imgs"));

        let db_max_connections: u32 = std::env::var("BOOKSWAP_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "BOOKSWAP_DB_MAX_CONNECTIONS",
                "must be a positive integer",
            ))?;

        Ok(Self {
            database_url,
            jwt_secret,
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            token_ttl_hours,
            images_dir,
            db_max_connections,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const OPTIONAL: [&str; 4] = [
        "BOOKSWAP_HTTP_PORT",
        "BOOKSWAP_TOKEN_TTL_HOURS",
        "BOOKSWAP_IMAGES_DIR",
        "BOOKSWAP_DB_MAX_CONNECTIONS",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }

        fn required(&mut self) {
            self.set("BOOKSWAP_DATABASE_URL", "sqlite::memory:");
            self.set("BOOKSWAP_JWT_SECRET", "secret");
            for key in OPTIONAL {
                self.remove(key);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.required();

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.jwt_secret, "secret");
        assert_eq!(config.http_addr.port(), 8000);
        assert_eq!(config.token_ttl_hours, 24);
        assert_eq!(config.images_dir, PathBuf::from(".data/imgs"));
        assert_eq!(config.db_max_connections, 10);
    }

    #[test]
    fn test_config_from_env_with_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.required();
        guard.set("BOOKSWAP_HTTP_PORT", "9090");
        guard.set("BOOKSWAP_TOKEN_TTL_HOURS", "2");
        guard.set("BOOKSWAP_IMAGES_DIR", "/srv/imgs");
        guard.set("BOOKSWAP_DB_MAX_CONNECTIONS", "3");

        let config = Config::from_env().unwrap();

        assert_eq!(config.http_addr.port(), 9090);
        assert_eq!(config.token_ttl_hours, 2);
        assert_eq!(config.images_dir, PathBuf::from("/srv/imgs"));
        assert_eq!(config.db_max_connections, 3);
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.required();
        guard.remove("BOOKSWAP_DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BOOKSWAP_DATABASE_URL")));
    }

    #[test]
    fn test_config_empty_secret_is_missing() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.required();
        guard.set("BOOKSWAP_JWT_SECRET", "");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BOOKSWAP_JWT_SECRET")));
    }

    #[test]
    fn test_config_invalid_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.required();

        guard.set("BOOKSWAP_HTTP_PORT", "not-a-port");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("BOOKSWAP_HTTP_PORT", _))
        ));
        guard.remove("BOOKSWAP_HTTP_PORT");

        guard.set("BOOKSWAP_TOKEN_TTL_HOURS", "0");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("BOOKSWAP_TOKEN_TTL_HOURS", _))
        ));
        guard.remove("BOOKSWAP_TOKEN_TTL_HOURS");

        guard.set("BOOKSWAP_DB_MAX_CONNECTIONS", "-1");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("BOOKSWAP_DB_MAX_CONNECTIONS", _))
        ));
    }
}
