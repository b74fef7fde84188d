//! Daemon configuration from environment variables.

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Variables that must be set before the daemon starts.
pub const REQUIRED_VARS: [&str; 7] = [
    "S3_ENDPOINT",
    "ACCESS_KEY_ID",
    "SECRET_ACCESS_KEY",
    "CLAIM_BUCKET_NAME",
    "STATE_BUCKET_NAME",
    "CLAIM_DB_PATH",
    "POLL_INTERVAL",
];

/// Default number of concurrent object fetches/deletes.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 16;

/// Signing region when `S3_REGION` is unset.
pub const DEFAULT_S3_REGION: &str = "auto";

/// Configuration for the query daemon.
#[derive(Clone)]
pub struct QueryConfig {
    /// Object-store endpoint (`https://...`, `file://<root>` or `memory://`)
    pub endpoint: String,

    /// S3 signing region
    pub region: String,

    /// Object-store access key
    pub access_key_id: String,

    /// Object-store secret key
    pub secret_access_key: String,

    /// Bucket the claim batches are read from
    pub claim_bucket: String,

    /// Bucket the snapshots are published to
    pub state_bucket: String,

    /// Claim database directory
    pub db_path: PathBuf,

    /// Sleep between update cycles
    pub poll_interval: Duration,

    /// Concurrent fetch/delete requests per cycle
    pub fetch_concurrency: usize,
}

impl QueryConfig {
    /// Load config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load config through an arbitrary variable lookup.
    ///
    /// Every required variable is checked and logged; the first missing one
    /// is reported in the error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = None;
        for var in REQUIRED_VARS {
            if lookup(var).is_some() {
                tracing::info!(var, "ENV var set");
            } else {
                tracing::error!(var, "Missing ENV var");
                missing.get_or_insert(var);
            }
        }
        if let Some(var) = missing {
            return Err(Error::Config(format!("missing environment variable {var}")));
        }
        tracing::info!("All ENV vars are set");

        let required = |name: &str| lookup(name).unwrap_or_default();

        let poll_secs: u64 = required("POLL_INTERVAL")
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid POLL_INTERVAL: {e}")))?;
        if poll_secs == 0 {
            return Err(Error::Config("POLL_INTERVAL must be positive".into()));
        }

        let fetch_concurrency = match lookup("FETCH_CONCURRENCY") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| Error::Config(format!("invalid FETCH_CONCURRENCY: {value}")))?,
            None => DEFAULT_FETCH_CONCURRENCY,
        };

        Ok(Self {
            endpoint: required("S3_ENDPOINT"),
            region: lookup("S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            access_key_id: required("ACCESS_KEY_ID"),
            secret_access_key: required("SECRET_ACCESS_KEY"),
            claim_bucket: required("CLAIM_BUCKET_NAME"),
            state_bucket: required("STATE_BUCKET_NAME"),
            db_path: PathBuf::from(required("CLAIM_DB_PATH")),
            poll_interval: Duration::from_secs(poll_secs),
            fetch_concurrency,
        })
    }
}

impl fmt::Debug for QueryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field("claim_bucket", &self.claim_bucket)
            .field("state_bucket", &self.state_bucket)
            .field("db_path", &self.db_path)
            .field("poll_interval", &self.poll_interval)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, String> {
        REQUIRED_VARS
            .iter()
            .map(|var| (*var, format!("{}-value", var.to_lowercase())))
            .chain([("POLL_INTERVAL", "30".to_string())])
            .collect()
    }

    #[test]
    fn loads_all_vars() {
        let env = full_env();
        let config = QueryConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.claim_bucket, "claim_bucket_name-value");
        assert_eq!(config.state_bucket, "state_bucket_name-value");
        assert_eq!(config.db_path, PathBuf::from("claim_db_path-value"));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.fetch_concurrency, DEFAULT_FETCH_CONCURRENCY);
        assert_eq!(config.region, DEFAULT_S3_REGION);
        assert_eq!(config.access_key_id, "access_key_id-value");
    }

    #[test]
    fn refuses_missing_var() {
        let mut env = full_env();
        env.remove("STATE_BUCKET_NAME");
        let err = QueryConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("STATE_BUCKET_NAME")));
    }

    #[test]
    fn rejects_bad_poll_interval() {
        let mut env = full_env();
        env.insert("POLL_INTERVAL", "soon".into());
        assert!(QueryConfig::from_lookup(|k| env.get(k).cloned()).is_err());

        env.insert("POLL_INTERVAL", "0".into());
        assert!(QueryConfig::from_lookup(|k| env.get(k).cloned()).is_err());
    }

    #[test]
    fn fetch_concurrency_override() {
        let mut env = full_env();
        env.insert("FETCH_CONCURRENCY", "4".into());
        let config = QueryConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.fetch_concurrency, 4);

        env.insert("FETCH_CONCURRENCY", "0".into());
        assert!(QueryConfig::from_lookup(|k| env.get(k).cloned()).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let env = full_env();
        let config = QueryConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret_access_key-value"));
        assert!(!debug.contains("access_key_id-value"));
    }
}
