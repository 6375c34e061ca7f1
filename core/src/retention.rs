use crate::archive::is_archive_name;
use crate::progress::{report, ProgressCallback, ProgressEvent};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl ArchiveInfo {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.modified
    }
}

/// Archives in `destination`, oldest first.
///
/// Only names matching `backup-*.tar.gz` count. Entries that cannot be
/// stat'd are logged and left out.
pub async fn list_archives<P: AsRef<Path>>(destination: P) -> Result<Vec<ArchiveInfo>> {
    let mut entries = fs::read_dir(destination.as_ref()).await?;
    let mut archives = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !is_archive_name(&name) {
            continue;
        }

        let path = entry.path();
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                warn!(archive = %name, error = %e, "Failed to stat archive");
                continue;
            }
        };
        let modified = match metadata.modified() {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(e) => {
                warn!(archive = %name, error = %e, "Archive has no modification time");
                continue;
            }
        };

        archives.push(ArchiveInfo {
            name,
            path,
            size: metadata.len(),
            modified,
        });
    }

    archives.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
    Ok(archives)
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Deletes archives whose last modification is older than `retention_days`.
///
/// A `retention_days` of zero or less disables the sweep. Failures are logged
/// per file and never abort the sweep or the caller.
pub async fn sweep<P: AsRef<Path>>(
    destination: P,
    retention_days: i64,
    progress: Option<&ProgressCallback>,
) -> SweepReport {
    if retention_days <= 0 {
        return SweepReport::default();
    }

    let Some(max_age) = Duration::try_days(retention_days) else {
        debug!(retention_days, "Retention period exceeds the representable range, nothing to sweep");
        return SweepReport::default();
    };

    let destination = destination.as_ref();
    let archives = match list_archives(destination).await {
        Ok(archives) => archives,
        Err(e) => {
            warn!(destination = %destination.display(), error = %e, "Retention sweep skipped");
            return SweepReport::default();
        }
    };

    prune_archives(archives, max_age, Utc::now(), progress).await
}

/// Deletes every listed archive older than `max_age` at `now`.
///
/// A deletion failure is recorded in [`SweepReport::failed`] and the remaining
/// archives are still processed.
pub async fn prune_archives(
    archives: Vec<ArchiveInfo>,
    max_age: Duration,
    now: DateTime<Utc>,
    progress: Option<&ProgressCallback>,
) -> SweepReport {
    let mut report_out = SweepReport::default();

    for archive in archives {
        if archive.age(now) <= max_age {
            continue;
        }
        match fs::remove_file(&archive.path).await {
            Ok(()) => {
                info!(archive = %archive.name, "Deleted old backup");
                report(
                    progress,
                    ProgressEvent::ArchiveDeleted {
                        name: archive.name.clone(),
                    },
                );
                report_out.deleted.push(archive.name);
            }
            Err(e) => {
                warn!(archive = %archive.name, error = %e, "Failed to delete old backup");
                report_out.failed.push(archive.name);
            }
        }
    }

    report_out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::METADATA_FILE;
    use std::fs::File;
    use std::time::{Duration as StdDuration, SystemTime};

    fn touch_aged(dir: &Path, name: &str, days: u64) {
        let path = dir.join(name);
        std::fs::write(&path, b"archive").unwrap();
        let mtime = SystemTime::now() - StdDuration::from_secs(days * 24 * 60 * 60);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired_archives() {
        let dir = tempfile::tempdir().unwrap();
        touch_aged(dir.path(), "backup-5.tar.gz", 5);
        touch_aged(dir.path(), "backup-40.tar.gz", 40);
        touch_aged(dir.path(), "backup-100.tar.gz", 100);
        touch_aged(dir.path(), METADATA_FILE, 200);
        touch_aged(dir.path(), "unrelated.tar.gz", 200);

        let result = sweep(dir.path(), 30, None).await;

        let mut deleted = result.deleted.clone();
        deleted.sort();
        assert_eq!(deleted, vec!["backup-100.tar.gz", "backup-40.tar.gz"]);
        assert!(result.failed.is_empty());
        assert!(dir.path().join("backup-5.tar.gz").exists());
        assert!(dir.path().join(METADATA_FILE).exists());
        assert!(dir.path().join("unrelated.tar.gz").exists());
    }

    #[tokio::test]
    async fn test_non_positive_retention_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        touch_aged(dir.path(), "backup-old.tar.gz", 400);

        assert!(sweep(dir.path(), 0, None).await.deleted.is_empty());
        assert!(sweep(dir.path(), -3, None).await.deleted.is_empty());
        assert!(dir.path().join("backup-old.tar.gz").exists());
    }

    #[tokio::test]
    async fn test_sweep_of_missing_destination_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let result = sweep(dir.path().join("missing"), 30, None).await;
        assert!(result.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_list_archives_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        touch_aged(dir.path(), "backup-b.tar.gz", 1);
        touch_aged(dir.path(), "backup-a.tar.gz", 10);
        std::fs::create_dir(dir.path().join("backup-dir.tar.gz")).unwrap();

        let names: Vec<String> = list_archives(dir.path())
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["backup-a.tar.gz", "backup-b.tar.gz"]);
    }

    #[tokio::test]
    async fn test_huge_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        touch_aged(dir.path(), "backup-old.tar.gz", 400);

        let result = sweep(dir.path(), 200_000_000_000, None).await;
        assert!(result.deleted.is_empty());
        assert!(result.failed.is_empty());
        assert!(dir.path().join("backup-old.tar.gz").exists());

        assert!(sweep(dir.path(), i64::MAX, None).await.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_failed_deletion_does_not_stop_sweep() {
        let dir = tempfile::tempdir().unwrap();
        touch_aged(dir.path(), "backup-a.tar.gz", 90);
        touch_aged(dir.path(), "backup-b.tar.gz", 60);
        touch_aged(dir.path(), "backup-c.tar.gz", 45);
        touch_aged(dir.path(), "backup-d.tar.gz", 2);

        let archives = list_archives(dir.path()).await.unwrap();
        // Gone between listing and deletion.
        std::fs::remove_file(dir.path().join("backup-b.tar.gz")).unwrap();

        let result = prune_archives(archives, Duration::days(30), Utc::now(), None).await;

        assert_eq!(result.failed, vec!["backup-b.tar.gz".to_string()]);
        assert_eq!(
            result.deleted,
            vec!["backup-a.tar.gz".to_string(), "backup-c.tar.gz".to_string()]
        );
        assert!(!dir.path().join("backup-a.tar.gz").exists());
        assert!(!dir.path().join("backup-c.tar.gz").exists());
        assert!(dir.path().join("backup-d.tar.gz").exists());
    }
}
