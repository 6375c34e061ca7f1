use crate::archive::{archive_name, write_archive, DEFAULT_COMPRESSION_LEVEL};
use crate::incremental::{plan, BackupPlan, ChangeDetection};
use crate::lock::DestinationLock;
use crate::metadata::{read_metadata, write_metadata};
use crate::progress::{report, ProgressCallback, ProgressEvent};
use crate::retention::sweep;
use crate::types::Metadata;
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, span, Instrument, Level};

pub const DEFAULT_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Skip files whose prior record still matches.
    pub incremental: bool,
    /// Archives older than this many days are deleted after the run. Zero or
    /// less keeps everything.
    pub retention_days: i64,
    pub compression_level: u32,
    pub detection: ChangeDetection,
    /// Plan only: no archive, metadata or retention changes.
    pub dry_run: bool,
}

impl BackupOptions {
    pub fn new<S: Into<PathBuf>, D: Into<PathBuf>>(source: S, destination: D) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            incremental: false,
            retention_days: DEFAULT_RETENTION_DAYS,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            detection: ChangeDetection::Quick,
            dry_run: false,
        }
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_detection(mut self, detection: ChangeDetection) -> Self {
        self.detection = detection;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub archive_name: String,
    /// `None` for a dry run.
    pub archive_path: Option<PathBuf>,
    pub version: u64,
    pub files_total: usize,
    pub files_archived: usize,
    pub files_reused: usize,
    pub bytes_archived: u64,
    pub swept: Vec<String>,
}

/// Runs one backup generation against a destination.
///
/// Callers must not point two engines at the same destination at once; the
/// destination lock turns that into a `LockConflict` error.
pub struct BackupEngine {
    options: BackupOptions,
    progress: Option<ProgressCallback>,
}

impl BackupEngine {
    pub fn new(options: BackupOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    pub async fn run(&self) -> Result<BackupReport> {
        let span = span!(Level::INFO, "backup", source = %self.options.source.display());
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<BackupReport> {
        let prepared = self.prepare().await?;
        self.execute(prepared).await
    }

    /// Locks the destination, loads the previous generation and plans the run.
    ///
    /// Nothing is written yet apart from the lock file. A dry run takes no lock.
    pub async fn prepare(&self) -> Result<PreparedBackup> {
        let opts = &self.options;
        let started = Utc::now();
        let name = archive_name(started);

        let lock = if opts.dry_run {
            None
        } else {
            fs::create_dir_all(&opts.destination).await?;
            Some(DestinationLock::acquire(&opts.destination).await?)
        };

        let previous = read_metadata(&opts.destination).await;
        let metadata = Metadata::next_generation(previous.as_ref(), started);
        info!(
            version = metadata.version,
            incremental = opts.incremental,
            previous = previous.is_some(),
            "Starting backup"
        );

        let source = opts.source.clone();
        let (incremental, detection) = (opts.incremental, opts.detection);
        let backup_plan = tokio::task::spawn_blocking(move || {
            plan(&source, previous.as_ref(), incremental, detection)
        })
        .await??;

        let report_out = BackupReport {
            archive_name: name,
            archive_path: None,
            version: metadata.version,
            files_total: backup_plan.files_total(),
            files_archived: backup_plan.to_archive.len(),
            files_reused: backup_plan.reused.len(),
            bytes_archived: backup_plan.bytes_to_archive(),
            swept: Vec::new(),
        };
        report(
            self.progress.as_ref(),
            ProgressEvent::Planned {
                files_total: report_out.files_total,
                files_to_archive: report_out.files_archived,
                bytes_to_archive: report_out.bytes_archived,
            },
        );

        Ok(PreparedBackup {
            _lock: lock,
            metadata,
            plan: backup_plan,
            report: report_out,
        })
    }

    /// Writes the archive, then the metadata, then sweeps old archives.
    ///
    /// Metadata is only replaced once the archive is complete, so a failed
    /// archive leaves the previous generation in place.
    pub async fn execute(&self, prepared: PreparedBackup) -> Result<BackupReport> {
        let opts = &self.options;
        let PreparedBackup {
            _lock,
            mut metadata,
            plan: backup_plan,
            report: mut backup_report,
        } = prepared;

        if opts.dry_run {
            info!(
                files = backup_report.files_total,
                to_archive = backup_report.files_archived,
                "Dry run finished"
            );
            return Ok(backup_report);
        }

        for record in backup_plan.reused {
            metadata.insert(record);
        }

        let name = backup_report.archive_name.clone();
        let archive_path = opts.destination.join(&name);
        info!(
            archive = %name,
            files = backup_report.files_archived,
            bytes = backup_report.bytes_archived,
            "Creating backup"
        );

        let to_archive = backup_plan.to_archive;
        let path = archive_path.clone();
        let level = opts.compression_level;
        let progress = self.progress.clone();
        let records = tokio::task::spawn_blocking(move || {
            write_archive(&path, &to_archive, level, |record| {
                report(
                    progress.as_ref(),
                    ProgressEvent::FileArchived {
                        path: record.path.clone(),
                        bytes: record.size,
                    },
                )
            })
        })
        .await??;

        for record in records {
            metadata.insert(record);
        }
        metadata.archive = Some(name.clone());
        write_metadata(&opts.destination, &metadata).await?;

        backup_report.archive_path = Some(archive_path);
        backup_report.swept = sweep(&opts.destination, opts.retention_days, self.progress.as_ref())
            .await
            .deleted;

        info!(archive = %name, files = metadata.file_count(), version = metadata.version, "Backup completed");
        Ok(backup_report)
    }
}

/// A planned run that still holds the destination lock.
pub struct PreparedBackup {
    _lock: Option<DestinationLock>,
    metadata: Metadata,
    plan: BackupPlan,
    report: BackupReport,
}

impl PreparedBackup {
    pub fn plan(&self) -> &BackupPlan {
        &self.plan
    }

    /// Counts as planned; `archive_path` and `swept` are filled in by execution.
    pub fn report(&self) -> &BackupReport {
        &self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::open_archive;
    use crate::hash::hash_bytes;
    use crate::lock::LOCK_FILE;
    use crate::metadata::metadata_path;
    use crate::restore::{restore_archive, RestoreOptions};
    use crate::Error;
    use std::collections::BTreeMap;
    use std::io::Read;
    use std::path::Path;
    use std::time::Duration;

    fn archive_contents(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut archive = open_archive(path).unwrap();
        let mut out = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            out.insert(name, data);
        }
        out
    }

    // Archive names have millisecond resolution.
    async fn run(options: BackupOptions) -> BackupReport {
        tokio::time::sleep(Duration::from_millis(5)).await;
        BackupEngine::new(options).run().await.unwrap()
    }

    fn write(root: &Path, rel: &str, data: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn test_single_file_full_then_incremental() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(src.path(), "a.txt", b"0123456789");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(src.path().join("a.txt"), std::fs::Permissions::from_mode(0o644)).unwrap();
        }

        let full = run(BackupOptions::new(src.path(), dest.path())).await;
        assert_eq!(full.version, 1);
        let contents = archive_contents(full.archive_path.as_ref().unwrap());
        assert_eq!(contents.keys().collect::<Vec<_>>(), vec!["a.txt"]);

        let first = read_metadata(dest.path()).await.unwrap();
        let record = first.get("a.txt").unwrap().clone();
        assert_eq!(record.size, 10);
        assert_eq!(record.digest, hash_bytes(b"0123456789"));
        #[cfg(unix)]
        assert_eq!(record.mode, 0o644);
        assert_eq!(first.archive.as_deref(), Some(full.archive_name.as_str()));

        let incremental = run(BackupOptions::new(src.path(), dest.path()).with_incremental(true)).await;
        assert_eq!(incremental.version, 2);
        assert_eq!(incremental.files_archived, 0);
        assert_eq!(incremental.files_reused, 1);
        assert!(archive_contents(incremental.archive_path.as_ref().unwrap()).is_empty());

        let second = read_metadata(dest.path()).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.get("a.txt"), Some(&record));
        assert!(!dest.path().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_full_backups_of_unchanged_tree_match() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(src.path(), "x/one.txt", b"one");
        write(src.path(), "two.bin", &[9u8; 4096]);

        let first = run(BackupOptions::new(src.path(), dest.path())).await;
        let first_meta = read_metadata(dest.path()).await.unwrap();
        let second = run(BackupOptions::new(src.path(), dest.path())).await;
        let second_meta = read_metadata(dest.path()).await.unwrap();

        assert_ne!(first.archive_name, second.archive_name);
        assert_eq!(
            archive_contents(first.archive_path.as_ref().unwrap()),
            archive_contents(second.archive_path.as_ref().unwrap())
        );
        for (path, record) in &first_meta.files {
            assert_eq!(second_meta.get(path).unwrap().digest, record.digest);
        }
    }

    #[tokio::test]
    async fn test_incremental_archives_only_changed_and_new() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(src.path(), "a.txt", b"stays the same");
        write(src.path(), "b.txt", b"short");

        run(BackupOptions::new(src.path(), dest.path())).await;
        let before = read_metadata(dest.path()).await.unwrap();

        write(src.path(), "b.txt", b"now it is considerably longer");
        write(src.path(), "c/new.txt", b"brand new");

        let report = run(BackupOptions::new(src.path(), dest.path()).with_incremental(true)).await;
        let after = read_metadata(dest.path()).await.unwrap();

        assert_eq!(after.get("a.txt"), before.get("a.txt"));
        assert_eq!(after.get("b.txt").unwrap().digest, hash_bytes(b"now it is considerably longer"));
        assert_eq!(after.get("c/new.txt").unwrap().digest, hash_bytes(b"brand new"));
        assert_eq!(after.file_count(), 3);

        let contents = archive_contents(report.archive_path.as_ref().unwrap());
        assert_eq!(contents.keys().collect::<Vec<_>>(), vec!["b.txt", "c/new.txt"]);
        assert_eq!(report.files_archived, 2);
        assert_eq!(report.files_reused, 1);
    }

    #[tokio::test]
    async fn test_versions_increase_and_reset_on_corruption() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(src.path(), "f.txt", b"f");
        let options = BackupOptions::new(src.path(), dest.path()).with_incremental(true);

        let versions = [
            run(options.clone()).await.version,
            run(options.clone()).await.version,
            run(options.clone()).await.version,
        ];
        assert_eq!(versions, [1, 2, 3]);

        std::fs::write(metadata_path(dest.path()), b"garbage").unwrap();
        let reset = run(options.clone()).await;
        assert_eq!(reset.version, 1);
        assert_eq!(reset.files_archived, 1);
        assert_eq!(run(options).await.version, 2);
    }

    #[tokio::test]
    async fn test_backup_then_restore_round_trips() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(src.path(), "top.txt", b"top level");
        write(src.path(), "nested/deeper/file.dat", &[1, 2, 3, 4, 5]);
        write(src.path(), "nested/empty.txt", b"");

        let report = run(BackupOptions::new(src.path(), dest.path())).await;
        restore_archive(report.archive_path.unwrap(), out.path(), RestoreOptions::default(), None)
            .await
            .unwrap();

        let metadata = read_metadata(dest.path()).await.unwrap();
        for (path, record) in &metadata.files {
            let restored = std::fs::read(out.path().join(path)).unwrap();
            assert_eq!(hash_bytes(&restored), record.digest);
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = std::fs::metadata(out.path().join(path)).unwrap().permissions().mode();
                assert_eq!(mode & 0o7777, record.mode);
            }
        }
        assert_eq!(metadata.file_count(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("never-created");
        write(src.path(), "a.txt", b"a");

        let report = run(BackupOptions::new(src.path(), &target).with_dry_run(true)).await;
        assert_eq!(report.files_total, 1);
        assert_eq!(report.files_archived, 1);
        assert!(report.archive_path.is_none());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_locked_destination_is_refused() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(src.path(), "a.txt", b"a");
        let _held = DestinationLock::acquire(dest.path()).await.unwrap();

        let result = BackupEngine::new(BackupOptions::new(src.path(), dest.path())).run().await;
        assert!(matches!(result, Err(Error::LockConflict(_))));
        assert!(read_metadata(dest.path()).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_metadata() {
        let dest = tempfile::tempdir().unwrap();
        let result = BackupEngine::new(BackupOptions::new(dest.path().join("nope"), dest.path()))
            .run()
            .await;

        assert!(result.is_err());
        assert!(read_metadata(dest.path()).await.is_none());
        assert!(!dest.path().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_archive_failure_keeps_previous_metadata() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(src.path(), "keep.txt", b"keep");
        write(src.path(), "vanishes.txt", b"soon gone");

        run(BackupOptions::new(src.path(), dest.path())).await;
        let before = read_metadata(dest.path()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let engine = BackupEngine::new(BackupOptions::new(src.path(), dest.path()));
        let prepared = engine.prepare().await.unwrap();
        assert_eq!(prepared.plan().to_archive.len(), 2);
        std::fs::remove_file(src.path().join("vanishes.txt")).unwrap();

        let result = engine.execute(prepared).await;
        assert!(matches!(result, Err(Error::Entry { .. })));
        assert_eq!(read_metadata(dest.path()).await.unwrap(), before);
        assert!(!dest.path().join(LOCK_FILE).exists());
    }
}
