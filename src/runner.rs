//! One full backup run, start to finish.
//!
//! Stage order: preflight → enumerate → dump-encrypt-upload → retention.
//! The reaper consumes the roster resolved by *this* run's enumerator, never
//! a cached one, and an empty roster skips cleanup entirely — an empty
//! active set must never drive deletions.

use std::collections::HashSet;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::dump::{self, PgDump};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::postgres;
use crate::retention;
use crate::storage::S3ObjectStore;
use crate::utils::format_duration;

/// Execute the full backup-and-retention workflow.
///
/// # Errors
///
/// Any configuration, enumeration, dump, encryption or upload failure aborts
/// the run. Cleanup-phase failures are logged and summarized but never
/// propagate: the next scheduled run repeats the same idempotent pass.
pub async fn execute(config: &Config) -> Result<()> {
    dump::check_pg_dump().await?;

    let client = postgres::connect(&config.postgres).await?;
    let version_tag = postgres::version_tag(&client).await?;
    info!(version_tag = %version_tag, "resolved server version");
    let targets = postgres::list_targets(&client, config.postgres.database.as_deref()).await?;

    let store = S3ObjectStore::connect(&config.storage).await;

    if targets.is_empty() {
        warn!("nothing to back up this run");
    } else {
        let work_dir =
            tempfile::tempdir().map_err(|e| Error::io("creating scratch directory", e))?;
        let dumper = PgDump::new(&config.postgres);
        let pipeline = Pipeline {
            dumper: &dumper,
            store: &store,
            prefix: &config.storage.prefix,
            version_tag: &version_tag,
            encryption_password: config.encryption_password.as_deref(),
            work_dir: work_dir.path(),
        };
        let uploaded = pipeline.execute(&targets).await?;
        info!(uploads = uploaded.len(), "all backups uploaded");
    }

    if let Some(threshold) = config.retention {
        if targets.is_empty() {
            warn!("skipping retention cleanup: no active databases were resolved this run");
        } else {
            let active: HashSet<String> = targets.iter().map(|t| t.name.clone()).collect();
            info!(threshold = %format_duration(threshold), "running retention cleanup");
            match retention::reap(&store, &config.storage.prefix, &active, threshold).await {
                Ok(outcome) => {
                    if !outcome.failures.is_empty() {
                        error!(
                            failures = outcome.failures.len(),
                            "some aged backups could not be deleted; the next run will retry"
                        );
                    }
                },
                Err(e) => error!(error = %e, "retention cleanup skipped"),
            }
        }
    }

    Ok(())
}
