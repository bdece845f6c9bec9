//! Database roster and server-version resolution.
//!
//! Queries go through `tokio-postgres` against the `postgres` maintenance
//! database; actual dumps are produced by `pg_dump` (see [`crate::dump`]).

use tokio_postgres::{Client, NoTls};
use tracing::{info, warn};

use crate::config::PostgresConfig;
use crate::error::{Error, Result};

/// One database eligible for backup this run.
///
/// Materialized fresh from a live query on every run; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTarget {
    pub name: String,
}

/// Template databases can't be dumped; the `postgres` maintenance database
/// is skipped deliberately.
const ROSTER_QUERY: &str =
    "SELECT datname FROM pg_database WHERE datistemplate = false AND datname <> 'postgres'";

/// Connect to the maintenance database.
///
/// # Errors
///
/// A connection failure is fatal for the run: no backups are attempted
/// without a confirmed roster.
pub async fn connect(config: &PostgresConfig) -> Result<Client> {
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .user(&config.user)
        .password(&config.password)
        .dbname("postgres");

    let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
        Error::enumeration(format!(
            "cannot connect to {}:{}: {e}",
            config.host, config.port
        ))
    })?;

    // The connection object drives the socket; it must be polled for the
    // client to make progress.
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!(error = %e, "postgres connection closed with error");
        }
    });

    Ok(client)
}

/// Resolve the roster of databases to back up.
///
/// An explicitly configured database short-circuits the query; its existence
/// is not pre-validated and a typo surfaces later as a dump failure.
pub async fn list_targets(client: &Client, explicit: Option<&str>) -> Result<Vec<BackupTarget>> {
    if let Some(name) = explicit {
        info!(database = %name, "backing up a single configured database");
        return Ok(vec![BackupTarget {
            name: name.to_string(),
        }]);
    }

    let rows = client
        .query(ROSTER_QUERY, &[])
        .await
        .map_err(|e| Error::enumeration(format!("roster query failed: {e}")))?;

    let targets: Vec<BackupTarget> = rows
        .into_iter()
        .map(|row| BackupTarget { name: row.get(0) })
        .collect();

    if targets.is_empty() {
        warn!("no user databases found to back up");
    } else {
        let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        info!(databases = ?names, "resolved backup roster");
    }

    Ok(targets)
}

/// Resolve the server's major version as an object-key path tag, e.g. `pg16`.
pub async fn version_tag(client: &Client) -> Result<String> {
    let row = client
        .query_one("SHOW server_version", &[])
        .await
        .map_err(|e| Error::enumeration(format!("server version query failed: {e}")))?;
    let raw: String = row.get(0);

    parse_version_tag(&raw)
        .ok_or_else(|| Error::enumeration(format!("cannot parse server version from '{raw}'")))
}

/// Extract the major version from strings like `16.4` or
/// `14.1 (Debian 14.1-1.pgdg110+1)`.
fn parse_version_tag(raw: &str) -> Option<String> {
    let major = raw.split_whitespace().next()?.split('.').next()?;
    if major.is_empty() || !major.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("pg{major}"))
}
