//! Retention planning and best-effort cleanup of aged backups.
//!
//! The reaper correlates the storage listing against the roster of databases
//! observed in the *same run*. The decision table, per listed object:
//!
//! | key parses? | database in roster? | older than cutoff? | action |
//! |-------------|---------------------|--------------------|--------|
//! | no          | —                   | —                  | retain |
//! | yes         | no                  | —                  | retain |
//! | yes         | yes                 | no (or equal)      | retain |
//! | yes         | yes                 | yes                | delete |
//!
//! A backup of a dropped or renamed database is therefore kept forever.
//! Age is decided by the timestamp encoded in the key — the only durable
//! record of when the dump was taken.
//!
//! Cleanup is a secondary, idempotent operation: individual delete failures
//! are accumulated and reported rather than aborting the pass, and no
//! cleanup failure changes the run's exit status.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::keys;
use crate::storage::{ObjectStore, RemoteObject};

/// Parse a retention threshold expression such as `30 days`, `12h` or
/// `2 weeks`. Whitespace between number and unit is tolerated.
pub fn parse_retention(expr: &str) -> Result<Duration> {
    let compact: String = expr.split_whitespace().collect();
    if compact.is_empty() {
        return Err(Error::config("retention expression is empty"));
    }
    let duration = humantime::parse_duration(&compact)
        .map_err(|e| Error::config(format!("invalid retention expression '{expr}': {e}")))?;
    Duration::from_std(duration)
        .map_err(|_| Error::config(format!("retention expression '{expr}' is out of range")))
}

/// Keys selected for deletion, plus counts of everything retained.
#[derive(Debug, Default)]
pub struct CleanupPlan {
    pub delete: Vec<String>,
    /// Active-database backups younger than the cutoff.
    pub kept_active: usize,
    /// Backups whose database is absent from the roster.
    pub kept_inactive: usize,
    /// Objects outside the naming grammar.
    pub kept_unparseable: usize,
}

/// Decide which objects to delete. Pure; all the retention edge cases live
/// here.
pub fn plan(
    objects: &[RemoteObject],
    active: &HashSet<String>,
    cutoff: DateTime<Utc>,
) -> CleanupPlan {
    let mut plan = CleanupPlan::default();
    for object in objects {
        let Some(parsed) = keys::parse(&object.key) else {
            warn!(key = %object.key, "retaining object outside the backup naming grammar");
            plan.kept_unparseable += 1;
            continue;
        };
        if !active.contains(&parsed.database) {
            info!(
                key = %object.key,
                database = %parsed.database,
                "retaining backup of database absent from the current roster"
            );
            plan.kept_inactive += 1;
            continue;
        }
        if parsed.timestamp < cutoff {
            plan.delete.push(object.key.clone());
        } else {
            plan.kept_active += 1;
        }
    }
    plan
}

/// One object the reaper failed to delete.
#[derive(Debug)]
pub struct CleanupFailure {
    pub key: String,
    pub reason: String,
}

/// Outcome of one cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupOutcome {
    pub deleted: Vec<String>,
    pub kept_active: usize,
    pub kept_inactive: usize,
    pub kept_unparseable: usize,
    pub failures: Vec<CleanupFailure>,
}

/// Delete aged backups of still-active databases under `prefix`.
///
/// # Errors
///
/// Only a failed listing returns an error; individual delete failures are
/// accumulated in the outcome.
pub async fn reap(
    store: &dyn ObjectStore,
    prefix: &str,
    active: &HashSet<String>,
    threshold: Duration,
) -> Result<CleanupOutcome> {
    let cutoff = Utc::now() - threshold;
    info!(
        prefix = %prefix,
        cutoff = %keys::format_timestamp(cutoff),
        "pruning backups older than cutoff"
    );

    // Listing with a path boundary keeps a sibling namespace like
    // `backup2/` out of a pass over `backup`.
    let list_prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{}/", prefix.trim_end_matches('/'))
    };
    let objects = store.list(&list_prefix).await?;
    if objects.is_empty() {
        info!(prefix = %prefix, "no existing backups under prefix, nothing to prune");
        return Ok(CleanupOutcome::default());
    }

    let plan = plan(&objects, active, cutoff);
    let mut outcome = CleanupOutcome {
        kept_active: plan.kept_active,
        kept_inactive: plan.kept_inactive,
        kept_unparseable: plan.kept_unparseable,
        ..CleanupOutcome::default()
    };

    for key in plan.delete {
        match store.delete(&key).await {
            Ok(()) => {
                info!(key = %key, "deleted aged backup");
                outcome.deleted.push(key);
            },
            Err(e) => {
                warn!(key = %key, error = %e, "failed to delete aged backup");
                outcome.failures.push(CleanupFailure {
                    key,
                    reason: e.to_string(),
                });
            },
        }
    }

    info!(
        deleted = outcome.deleted.len(),
        kept_active = outcome.kept_active,
        kept_inactive = outcome.kept_inactive,
        kept_unparseable = outcome.kept_unparseable,
        failures = outcome.failures.len(),
        "cleanup finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::path::Path;

    fn object(key: &str) -> RemoteObject {
        RemoteObject {
            key: key.to_string(),
            size: 1,
            last_modified: None,
        }
    }

    fn active(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    fn at(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_retention_accepts_spaced_units() {
        assert_eq!(parse_retention("30 days").unwrap(), Duration::days(30));
        assert_eq!(parse_retention("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_retention("12 hours").unwrap(), Duration::hours(12));
    }

    #[test]
    fn test_parse_retention_rejects_garbage() {
        assert!(parse_retention("").is_err());
        assert!(parse_retention("soon").is_err());
        assert!(parse_retention("-3 days").is_err());
        assert!(parse_retention("30").is_err());
    }

    #[test]
    fn test_plan_preserves_inactive_databases_regardless_of_age() {
        // Decades older than any plausible threshold.
        let objects = [object("backup/pg16/legacy_db_1999-01-01T00:00:00Z.sql.gz")];
        let plan = plan(&objects, &active(&["app_db"]), at(2024, 1, 1));

        assert!(plan.delete.is_empty());
        assert_eq!(plan.kept_inactive, 1);
    }

    #[test]
    fn test_plan_deletes_only_aged_active_objects() {
        let objects = [
            object("backup/pg16/app_db_2023-01-01T00:00:00Z.sql.gz"),
            object("backup/pg16/app_db_2023-06-15T00:00:00Z.sql.gz"),
        ];
        let plan = plan(&objects, &active(&["app_db"]), at(2023, 3, 1));

        assert_eq!(
            plan.delete,
            vec!["backup/pg16/app_db_2023-01-01T00:00:00Z.sql.gz"]
        );
        assert_eq!(plan.kept_active, 1);
    }

    #[test]
    fn test_plan_boundary_exactly_at_cutoff_is_retained() {
        let objects = [object("backup/pg16/app_db_2023-03-01T00:00:00Z.sql.gz")];
        let plan = plan(&objects, &active(&["app_db"]), at(2023, 3, 1));

        assert!(plan.delete.is_empty());
        assert_eq!(plan.kept_active, 1);
    }

    #[test]
    fn test_plan_one_second_past_cutoff_is_deleted() {
        let objects = [object("backup/pg16/app_db_2023-02-28T23:59:59Z.sql.gz")];
        let plan = plan(&objects, &active(&["app_db"]), at(2023, 3, 1));

        assert_eq!(plan.delete.len(), 1);
    }

    #[test]
    fn test_plan_never_deletes_unparseable_keys() {
        let objects = [
            object("backup/pg16/notes.txt"),
            object("backup/pg16/_2020-01-01T00:00:00Z.sql.gz"),
            object("backup/pg16/app_db.sql.gz"),
        ];
        let plan = plan(&objects, &active(&["app_db"]), at(2024, 1, 1));

        assert!(plan.delete.is_empty());
        assert_eq!(plan.kept_unparseable, 3);
    }

    #[test]
    fn test_plan_matches_underscored_names_exactly() {
        let objects = [object("backup/pg16/app_db_2_2020-01-01T00:00:00Z.sql.gz")];

        // "app_db_2" active: the aged object belongs to it and goes.
        let deleted = plan(&objects, &active(&["app_db_2"]), at(2024, 1, 1));
        assert_eq!(deleted.delete.len(), 1);

        // Only "app_db" active: the object's database is someone else's.
        let kept = plan(&objects, &active(&["app_db"]), at(2024, 1, 1));
        assert!(kept.delete.is_empty());
        assert_eq!(kept.kept_inactive, 1);
    }

    #[tokio::test]
    async fn test_reap_is_idempotent() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(91);
        let fresh = Utc::now() - Duration::days(1);
        store.insert(keys::compose("backup", "pg16", "app_db", old, false), vec![0]);
        store.insert(
            keys::compose("backup", "pg16", "app_db", fresh, false),
            vec![0],
        );

        let roster = active(&["app_db"]);
        let first = reap(&store, "backup", &roster, Duration::days(30))
            .await
            .unwrap();
        assert_eq!(first.deleted.len(), 1);
        assert_eq!(store.len(), 1);

        let second = reap(&store, "backup", &roster, Duration::days(30))
            .await
            .unwrap();
        assert!(second.deleted.is_empty());
        assert!(second.failures.is_empty());
        assert_eq!(store.len(), 1);
    }

    /// Delegates to a `MemoryStore` but refuses to delete one key.
    struct FlakyStore {
        inner: MemoryStore,
        fail_key: String,
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put(&self, key: &str, path: &Path) -> crate::error::Result<()> {
            self.inner.put(key, path).await
        }

        async fn list(&self, prefix: &str) -> crate::error::Result<Vec<RemoteObject>> {
            self.inner.list(prefix).await
        }

        async fn delete(&self, key: &str) -> crate::error::Result<()> {
            if key == self.fail_key {
                return Err(Error::delete(key, "simulated storage failure"));
            }
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_reap_continues_after_delete_failure() {
        let old = Utc::now() - Duration::days(91);
        let stuck = keys::compose("backup", "pg16", "alpha", old, false);
        let inner = MemoryStore::new();
        inner.insert(stuck.clone(), vec![0]);
        inner.insert(keys::compose("backup", "pg16", "beta", old, false), vec![0]);
        let store = FlakyStore {
            inner,
            fail_key: stuck.clone(),
        };

        let outcome = reap(
            &store,
            "backup",
            &active(&["alpha", "beta"]),
            Duration::days(30),
        )
        .await
        .unwrap();

        assert_eq!(outcome.deleted.len(), 1);
        assert!(outcome.deleted[0].contains("/beta_"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].key, stuck);
    }
}
