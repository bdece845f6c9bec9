//! The sequential dump → encrypt → upload loop.
//!
//! One full cycle completes per database before the next begins, which
//! bounds local disk usage to a single in-flight dump (plus, transiently,
//! its encrypted sibling). Any dump, encryption or upload failure aborts
//! the whole run: a partial backup set is never silently extended.

use std::path::Path;

use chrono::Utc;
use tracing::{info, warn};

use crate::dump::Dumper;
use crate::encrypt;
use crate::error::{Error, Result};
use crate::keys;
use crate::postgres::BackupTarget;
use crate::storage::ObjectStore;
use crate::utils::format_bytes;

/// One successfully uploaded backup.
#[derive(Debug, Clone)]
pub struct UploadedBackup {
    pub database: String,
    pub key: String,
    pub encrypted: bool,
    pub size: u64,
}

/// Backup pipeline over one run's roster.
pub struct Pipeline<'a> {
    pub dumper: &'a dyn Dumper,
    pub store: &'a dyn ObjectStore,
    pub prefix: &'a str,
    pub version_tag: &'a str,
    pub encryption_password: Option<&'a str>,
    pub work_dir: &'a Path,
}

impl Pipeline<'_> {
    /// Dump, optionally encrypt, and upload every target in roster order.
    pub async fn execute(&self, targets: &[BackupTarget]) -> Result<Vec<UploadedBackup>> {
        let mut uploaded = Vec::with_capacity(targets.len());
        for target in targets {
            uploaded.push(self.process(target).await?);
        }
        Ok(uploaded)
    }

    async fn process(&self, target: &BackupTarget) -> Result<UploadedBackup> {
        // The name becomes a path component of the local artifact.
        if target.name.contains(['/', '\\']) {
            return Err(Error::dump(
                &target.name,
                "database name contains path separators",
            ));
        }

        info!(database = %target.name, "processing database");
        let local = self
            .work_dir
            .join(format!("{}{}", target.name, keys::DUMP_SUFFIX));
        self.dumper.dump(&target.name, &local).await?;
        let created_at = Utc::now();

        let (artifact, encrypted) = match self.encryption_password {
            Some(password) => (encrypt::encrypt_artifact(&local, password).await?, true),
            None => (local, false),
        };

        let size = tokio::fs::metadata(&artifact)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let key = keys::compose(
            self.prefix,
            self.version_tag,
            &target.name,
            created_at,
            encrypted,
        );
        self.store.put(&key, &artifact).await?;
        info!(
            database = %target.name,
            key = %key,
            size = %format_bytes(size),
            "backup uploaded"
        );

        // No local retention once the object is durable.
        if let Err(e) = tokio::fs::remove_file(&artifact).await {
            warn!(
                path = %artifact.display(),
                error = %e,
                "could not remove local artifact after upload"
            );
        }

        Ok(UploadedBackup {
            database: target.name.clone(),
            key,
            encrypted,
            size,
        })
    }
}
