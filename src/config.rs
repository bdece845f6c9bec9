//! Configuration resolution from the process environment.
//!
//! All settings arrive as flat string key/value pairs. [`Config::from_env`]
//! reads the process environment once at startup and produces an immutable
//! value that is passed by reference into every stage — no component reads
//! ambient environment state after resolution. [`Config::from_map`] takes any
//! map, which is what the tests use.
//!
//! Missing required settings are collected and reported together so an
//! operator fixes one deploy, not six.

use std::collections::HashMap;

use crate::constants::{DEFAULT_POSTGRES_PORT, DEFAULT_S3_PREFIX, DEFAULT_S3_REGION};
use crate::error::{Error, Result};
use crate::retention;
use crate::utils::format_duration;

pub const ENV_S3_ACCESS_KEY_ID: &str = "S3_ACCESS_KEY_ID";
pub const ENV_S3_SECRET_ACCESS_KEY: &str = "S3_SECRET_ACCESS_KEY";
pub const ENV_S3_BUCKET: &str = "S3_BUCKET";
pub const ENV_S3_REGION: &str = "S3_REGION";
pub const ENV_S3_PREFIX: &str = "S3_PREFIX";
pub const ENV_S3_ENDPOINT: &str = "S3_ENDPOINT";
pub const ENV_POSTGRES_HOST: &str = "POSTGRES_HOST";
pub const ENV_POSTGRES_PORT: &str = "POSTGRES_PORT";
pub const ENV_POSTGRES_USER: &str = "POSTGRES_USER";
pub const ENV_POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const ENV_POSTGRES_DATABASE: &str = "POSTGRES_DATABASE";
pub const ENV_POSTGRES_EXTRA_OPTS: &str = "POSTGRES_EXTRA_OPTS";
pub const ENV_ENCRYPTION_PASSWORD: &str = "ENCRYPTION_PASSWORD";
pub const ENV_DELETE_OLDER_THAN: &str = "DELETE_OLDER_THAN";

/// Object storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub region: String,
    /// Object-key prefix, without leading or trailing slashes.
    pub prefix: String,
    /// Custom endpoint for S3-compatible, non-AWS storage.
    pub endpoint: Option<String>,
}

/// Database server settings.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Extra `pg_dump` arguments, already split into an argument vector.
    pub extra_options: Vec<String>,
    /// Back up only this database instead of the full roster.
    pub database: Option<String>,
}

/// Validated configuration for one backup run.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub postgres: PostgresConfig,
    /// Present ⇒ dump artifacts are encrypted before upload.
    pub encryption_password: Option<String>,
    /// Present ⇒ aged backups of active databases are pruned after upload.
    pub retention: Option<chrono::Duration>,
}

impl Config {
    /// Resolve configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming every missing required setting, or describing
    /// a malformed optional one.
    pub fn from_env() -> Result<Self> {
        Self::from_map(&std::env::vars().collect())
    }

    /// Resolve configuration from a flat settings map.
    ///
    /// Unset and empty values are treated identically, matching how
    /// container schedulers pass through optional environment variables.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let mut missing = Vec::new();
        let access_key_id = required(vars, ENV_S3_ACCESS_KEY_ID, &mut missing);
        let secret_access_key = required(vars, ENV_S3_SECRET_ACCESS_KEY, &mut missing);
        let bucket = required(vars, ENV_S3_BUCKET, &mut missing);
        let host = required(vars, ENV_POSTGRES_HOST, &mut missing);
        let user = required(vars, ENV_POSTGRES_USER, &mut missing);
        let password = required(vars, ENV_POSTGRES_PASSWORD, &mut missing);
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let port = match optional(vars, ENV_POSTGRES_PORT) {
            Some(raw) => raw.parse().map_err(|_| {
                Error::config(format!(
                    "{ENV_POSTGRES_PORT} must be a port number, got '{raw}'"
                ))
            })?,
            None => DEFAULT_POSTGRES_PORT,
        };

        let retention = optional(vars, ENV_DELETE_OLDER_THAN)
            .map(|raw| retention::parse_retention(&raw))
            .transpose()?;

        let prefix = optional(vars, ENV_S3_PREFIX)
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_S3_PREFIX.to_string());

        let extra_options = optional(vars, ENV_POSTGRES_EXTRA_OPTS)
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            storage: StorageConfig {
                access_key_id,
                secret_access_key,
                bucket,
                region: optional(vars, ENV_S3_REGION)
                    .unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
                prefix,
                endpoint: optional(vars, ENV_S3_ENDPOINT),
            },
            postgres: PostgresConfig {
                host,
                port,
                user,
                password,
                extra_options,
                database: optional(vars, ENV_POSTGRES_DATABASE),
            },
            encryption_password: optional(vars, ENV_ENCRYPTION_PASSWORD),
            retention,
        })
    }

    /// Log the resolved configuration. Secrets are never included.
    pub fn log_summary(&self) {
        let retention = self.retention.map(format_duration);
        tracing::info!(
            bucket = %self.storage.bucket,
            region = %self.storage.region,
            prefix = %self.storage.prefix,
            endpoint = self.storage.endpoint.as_deref(),
            host = %self.postgres.host,
            port = self.postgres.port,
            user = %self.postgres.user,
            database = self.postgres.database.as_deref(),
            encryption = self.encryption_password.is_some(),
            retention = retention.as_deref(),
            "configuration resolved"
        );
    }
}

fn required(
    vars: &HashMap<String, String>,
    key: &'static str,
    missing: &mut Vec<&'static str>,
) -> String {
    match vars.get(key).filter(|v| !v.is_empty()) {
        Some(value) => value.clone(),
        None => {
            missing.push(key);
            String::new()
        },
    }
}

fn optional(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key).filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            (ENV_S3_ACCESS_KEY_ID, "AKIA_TEST"),
            (ENV_S3_SECRET_ACCESS_KEY, "secret"),
            (ENV_S3_BUCKET, "backups"),
            (ENV_POSTGRES_HOST, "db.internal"),
            (ENV_POSTGRES_USER, "backup"),
            (ENV_POSTGRES_PASSWORD, "hunter2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_resolves_with_defaults() {
        let config = Config::from_map(&base_vars()).unwrap();
        assert_eq!(config.storage.region, "us-west-1");
        assert_eq!(config.storage.prefix, "backup");
        assert_eq!(config.storage.endpoint, None);
        assert_eq!(config.postgres.port, 5432);
        assert!(config.postgres.extra_options.is_empty());
        assert_eq!(config.postgres.database, None);
        assert_eq!(config.encryption_password, None);
        assert_eq!(config.retention, None);
    }

    #[test]
    fn test_missing_required_settings_reported_together() {
        let mut vars = base_vars();
        vars.remove(ENV_S3_BUCKET);
        vars.remove(ENV_POSTGRES_PASSWORD);

        let err = Config::from_map(&vars).unwrap_err().to_string();
        assert!(err.contains(ENV_S3_BUCKET));
        assert!(err.contains(ENV_POSTGRES_PASSWORD));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut vars = base_vars();
        vars.insert(ENV_POSTGRES_HOST.to_string(), String::new());

        let err = Config::from_map(&vars).unwrap_err().to_string();
        assert!(err.contains(ENV_POSTGRES_HOST));
    }

    #[test]
    fn test_prefix_slashes_trimmed() {
        let mut vars = base_vars();
        vars.insert(ENV_S3_PREFIX.to_string(), "/nightly/pg/".to_string());

        let config = Config::from_map(&vars).unwrap();
        assert_eq!(config.storage.prefix, "nightly/pg");
    }

    #[test]
    fn test_extra_options_split_into_argv() {
        let mut vars = base_vars();
        vars.insert(
            ENV_POSTGRES_EXTRA_OPTS.to_string(),
            "--schema=public --exclude-table=audit_log".to_string(),
        );

        let config = Config::from_map(&vars).unwrap();
        assert_eq!(
            config.postgres.extra_options,
            vec!["--schema=public", "--exclude-table=audit_log"]
        );
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut vars = base_vars();
        vars.insert(ENV_POSTGRES_PORT.to_string(), "54zz".to_string());

        let err = Config::from_map(&vars).unwrap_err().to_string();
        assert!(err.contains(ENV_POSTGRES_PORT));
    }

    #[test]
    fn test_retention_expression_parsed() {
        let mut vars = base_vars();
        vars.insert(ENV_DELETE_OLDER_THAN.to_string(), "30 days".to_string());

        let config = Config::from_map(&vars).unwrap();
        assert_eq!(config.retention, Some(chrono::Duration::days(30)));
    }

    #[test]
    fn test_invalid_retention_rejected() {
        let mut vars = base_vars();
        vars.insert(ENV_DELETE_OLDER_THAN.to_string(), "a fortnight".to_string());

        assert!(Config::from_map(&vars).is_err());
    }

    #[test]
    fn test_feature_gates() {
        let mut vars = base_vars();
        vars.insert(ENV_ENCRYPTION_PASSWORD.to_string(), "swordfish".to_string());
        vars.insert(ENV_POSTGRES_DATABASE.to_string(), "app_db".to_string());
        vars.insert(ENV_S3_ENDPOINT.to_string(), "http://minio:9000".to_string());

        let config = Config::from_map(&vars).unwrap();
        assert_eq!(config.encryption_password.as_deref(), Some("swordfish"));
        assert_eq!(config.postgres.database.as_deref(), Some("app_db"));
        assert_eq!(
            config.storage.endpoint.as_deref(),
            Some("http://minio:9000")
        );
    }
}
