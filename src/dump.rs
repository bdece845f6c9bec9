//! `pg_dump` invocation.
//!
//! Dumps are produced by spawning `pg_dump` with a structured argument
//! vector — never a shell string, so database names containing shell
//! metacharacters cannot inject anything — and gzip-compressing its stdout
//! while it streams to disk.

use std::path::Path;
use std::process::Stdio;

use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::PostgresConfig;
use crate::error::{Error, Result};
use crate::utils::format_bytes;

/// Narrow capability interface over the dump collaborator, so pipeline
/// behavior is testable without a live server.
#[async_trait]
pub trait Dumper: Send + Sync {
    /// Produce a compressed dump of `database` at `dest`.
    async fn dump(&self, database: &str, dest: &Path) -> Result<()>;
}

/// Probe that `pg_dump` is installed and runnable.
pub async fn check_pg_dump() -> Result<()> {
    match Command::new("pg_dump").arg("--version").output().await {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            debug!(version = %version.trim(), "pg_dump available");
            Ok(())
        },
        Ok(output) => Err(Error::missing_tool(
            "pg_dump",
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
        Err(e) => Err(Error::missing_tool("pg_dump", e.to_string())),
    }
}

/// Dumps one database by streaming plain-format `pg_dump` output through a
/// gzip encoder into `<database>.sql.gz`.
pub struct PgDump {
    host: String,
    port: u16,
    user: String,
    password: String,
    extra_args: Vec<String>,
}

impl PgDump {
    pub fn new(config: &PostgresConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            extra_args: config.extra_options.clone(),
        }
    }

    fn command(&self, database: &str) -> Command {
        let mut cmd = Command::new("pg_dump");
        cmd.arg("-h")
            .arg(&self.host)
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-U")
            .arg(&self.user)
            .arg("--no-password")
            .arg("--format=plain")
            .arg("--no-owner")
            .arg("--clean")
            .arg("--no-acl")
            .args(&self.extra_args)
            .arg(format!("--dbname={database}"))
            .env("PGPASSWORD", &self.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl Dumper for PgDump {
    async fn dump(&self, database: &str, dest: &Path) -> Result<()> {
        info!(database = %database, dest = %dest.display(), "dumping database");

        let mut child = self
            .command(database)
            .spawn()
            .map_err(|e| Error::dump(database, format!("failed to spawn pg_dump: {e}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::dump(database, "pg_dump stdout not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::dump(database, "pg_dump stderr not captured"))?;

        let file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::io(format!("creating dump file {}", dest.display()), e))?;
        let mut encoder = GzipEncoder::new(file);

        // Drain stderr concurrently so a chatty pg_dump can't deadlock on a
        // full pipe while we're still consuming stdout.
        let (copied, diagnostics) = tokio::join!(
            tokio::io::copy(&mut stdout, &mut encoder),
            async {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            }
        );
        let status = child
            .wait()
            .await
            .map_err(|e| Error::dump(database, format!("waiting for pg_dump: {e}")))?;
        let diagnostics = String::from_utf8_lossy(&diagnostics).trim().to_string();

        if let Err(e) = copied {
            remove_partial(dest).await;
            return Err(Error::dump(
                database,
                format!("writing dump output failed: {e}"),
            ));
        }
        if let Err(e) = encoder.shutdown().await {
            remove_partial(dest).await;
            return Err(Error::dump(
                database,
                format!("finalizing compressed dump failed: {e}"),
            ));
        }
        if !status.success() {
            remove_partial(dest).await;
            let reason = if diagnostics.is_empty() {
                format!("pg_dump exited with {status}")
            } else {
                diagnostics
            };
            return Err(Error::dump(database, reason));
        }

        let size = tokio::fs::metadata(dest)
            .await
            .map_err(|e| Error::io(format!("checking dump file {}", dest.display()), e))?
            .len();
        if size == 0 {
            remove_partial(dest).await;
            return Err(Error::dump(database, "pg_dump produced an empty dump"));
        }

        info!(database = %database, size = %format_bytes(size), "database dumped");
        Ok(())
    }
}

/// Remove an incomplete dump so it can never be uploaded.
async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "could not remove incomplete dump file");
    }
}
