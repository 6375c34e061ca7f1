use super::{format_size, progress_bar};
use crate::config::Config;
use crate::validate;
use anyhow::Result;
use clap::Args;
use goback_core::{BackupEngine, BackupOptions, ChangeDetection, ProgressCallback, ProgressEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
pub struct BackupCommand {
    #[arg(short, long, env = "GOBACK_SOURCE", help = "Directory to back up")]
    source: Option<PathBuf>,

    #[arg(short, long, env = "GOBACK_DESTINATION", help = "Directory holding archives and metadata")]
    destination: Option<PathBuf>,

    #[arg(short, long, help = "Only archive files changed since the previous run")]
    incremental: bool,

    #[arg(long, conflicts_with = "incremental", help = "Archive every file, overriding an incremental config")]
    full: bool,

    #[arg(
        short = 'r',
        long = "retention",
        env = "GOBACK_RETENTION_DAYS",
        allow_negative_numbers = true,
        help = "Delete archives older than this many days (0 keeps all)"
    )]
    retention_days: Option<i64>,

    #[arg(long, help = "Re-hash files whose size and mtime are unchanged")]
    checksum: bool,

    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=9), help = "Gzip level 0-9")]
    compression_level: Option<u32>,

    #[arg(long, help = "Dry run - report what would be archived")]
    dry_run: bool,

    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

impl BackupCommand {
    fn incremental_enabled(&self, config: &Config) -> bool {
        if self.full {
            return false;
        }
        self.incremental || config.backup.incremental
    }

    pub async fn run(&self, cli: &crate::Cli, config: &Config) -> Result<()> {
        let source = validate::backup_source(self.source.as_deref())?;
        let destination = validate::destination(self.destination.as_deref())?;

        let detection = if self.checksum || config.backup.checksum {
            ChangeDetection::Checksum
        } else {
            ChangeDetection::Quick
        };
        let options = BackupOptions::new(&source, &destination)
            .with_incremental(self.incremental_enabled(config))
            .with_retention_days(self.retention_days.unwrap_or(config.backup.retention_days))
            .with_compression_level(self.compression_level.unwrap_or(config.backup.compression_level))
            .with_detection(detection)
            .with_dry_run(self.dry_run);

        info!("Backing up {} to {}", source.display(), destination.display());

        let pb = progress_bar(cli, 0)?;
        pb.set_message("Scanning files...");
        let bar = pb.clone();
        let progress: ProgressCallback = Arc::new(move |event: ProgressEvent| match event {
            ProgressEvent::Planned { files_to_archive, .. } => {
                bar.set_length(files_to_archive as u64);
                bar.set_message("Archiving");
            }
            ProgressEvent::FileArchived { path, .. } => {
                bar.set_message(path);
                bar.inc(1);
            }
            ProgressEvent::ArchiveDeleted { name } => {
                bar.println(format!("🗑️  Deleted old backup: {}", name));
            }
            ProgressEvent::FileRestored { .. } => {}
        });

        let report = BackupEngine::new(options).with_progress(progress).run().await?;
        pb.finish_and_clear();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        if self.dry_run {
            println!(
                "Dry run completed - would archive {} of {} files ({})",
                report.files_archived,
                report.files_total,
                format_size(report.bytes_archived)
            );
            return Ok(());
        }

        println!("✅ Backup completed: {}", report.archive_name);
        println!("🔢 Version: {}", report.version);
        println!("📁 Files backed up: {}", report.files_total);
        println!("📦 Archived: {} ({})", report.files_archived, format_size(report.bytes_archived));
        if report.files_reused > 0 {
            println!("♻️  Unchanged: {}", report.files_reused);
        }
        if !report.swept.is_empty() {
            println!("🗑️  Pruned: {} old archives", report.swept.len());
        }

        Ok(())
    }
}
