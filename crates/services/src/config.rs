//! Runtime configuration read from `SECURED_*` environment variables.

use std::path::PathBuf;

use storage::rest::RestConfig;

use crate::error::ConfigError;

pub const DEFAULT_DB_URL: &str = "sqlite://secured.sqlite3";
pub const DEFAULT_LOG_FILTER: &str = "app=info,services=info,storage=info";

pub const ENV_STORE: &str = "SECURED_STORE";
pub const ENV_DB_URL: &str = "SECURED_DB_URL";
pub const ENV_REST_URL: &str = "SECURED_REST_URL";
pub const ENV_REST_KEY: &str = "SECURED_REST_KEY";
pub const ENV_CATALOG: &str = "SECURED_CATALOG";
pub const ENV_BCRYPT_COST: &str = "SECURED_BCRYPT_COST";
pub const ENV_LOG: &str = "SECURED_LOG";

/// Where learner progress is kept.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Sqlite { url: String },
    Memory,
    Rest(RestConfig),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    /// JSON lesson file; the built-in lessons are used when unset.
    pub catalog_path: Option<PathBuf>,
    pub bcrypt_cost: u32,
    pub log_filter: String,
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unknown backend, missing REST settings or a
    /// malformed number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let store = match get(ENV_STORE).as_deref().unwrap_or("sqlite") {
            "sqlite" => StoreBackend::Sqlite {
                url: get(ENV_DB_URL).unwrap_or_else(|| DEFAULT_DB_URL.to_string()),
            },
            "memory" => StoreBackend::Memory,
            "rest" => {
                let url = get(ENV_REST_URL).ok_or(ConfigError::MissingRestSetting(ENV_REST_URL))?;
                let key = get(ENV_REST_KEY).ok_or(ConfigError::MissingRestSetting(ENV_REST_KEY))?;
                StoreBackend::Rest(RestConfig::new(url, key))
            }
            other => return Err(ConfigError::UnknownStore(other.to_string())),
        };

        let bcrypt_cost = match get(ENV_BCRYPT_COST) {
            None => bcrypt::DEFAULT_COST,
            Some(raw) => match raw.parse::<u32>() {
                Ok(cost) if (4..=31).contains(&cost) => cost,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        key: ENV_BCRYPT_COST,
                        raw,
                    });
                }
            },
        };

        let log_filter = get(ENV_LOG)
            .or_else(|| get("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            store,
            catalog_path: get(ENV_CATALOG).map(PathBuf::from),
            bcrypt_cost,
            log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_local_sqlite() {
        let cfg = config(&[]).unwrap();
        assert!(matches!(&cfg.store, StoreBackend::Sqlite { url } if url == DEFAULT_DB_URL));
        assert!(cfg.catalog_path.is_none());
        assert_eq!(cfg.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(cfg.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn rest_backend_needs_url_and_key() {
        let err = config(&[(ENV_STORE, "rest"), (ENV_REST_URL, "https://x.supabase.co")])
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingRestSetting(ENV_REST_KEY));

        let cfg = config(&[
            (ENV_STORE, "rest"),
            (ENV_REST_URL, "https://x.supabase.co"),
            (ENV_REST_KEY, "anon"),
        ])
        .unwrap();
        let StoreBackend::Rest(rest) = cfg.store else {
            panic!("expected rest backend");
        };
        assert_eq!(rest.api_key, "anon");
    }

    #[test]
    fn rejects_unknown_backend_and_bad_cost() {
        assert_eq!(
            config(&[(ENV_STORE, "mongo")]).unwrap_err(),
            ConfigError::UnknownStore("mongo".into())
        );
        assert!(matches!(
            config(&[(ENV_BCRYPT_COST, "2")]).unwrap_err(),
            ConfigError::InvalidNumber { .. }
        ));
    }

    #[test]
    fn secured_log_wins_over_rust_log() {
        let cfg = config(&[("RUST_LOG", "debug"), (ENV_LOG, "services=trace")]).unwrap();
        assert_eq!(cfg.log_filter, "services=trace");
        let cfg = config(&[("RUST_LOG", "debug"), (ENV_STORE, " memory ")]).unwrap();
        assert_eq!(cfg.log_filter, "debug");
        assert!(matches!(cfg.store, StoreBackend::Memory));
    }
}
