use super::{format_size, spinner};
use crate::validate;
use anyhow::Result;
use clap::Args;
use goback_core::{restore_archive, ProgressCallback, ProgressEvent, RestoreOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args)]
pub struct RestoreCommand {
    #[arg(help = "Archive to restore (.tar.gz)")]
    archive: PathBuf,

    #[arg(help = "Target directory for restore")]
    target: PathBuf,

    #[arg(long, help = "Fail on entries that would land outside the target directory")]
    strict_paths: bool,
}

impl RestoreCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let archive = validate::archive(&self.archive)?;
        let target = validate::destination(Some(&self.target))?;

        info!("Restoring {} into {}", archive.display(), target.display());

        let pb = spinner(cli, "Restoring...")?;
        let bar = pb.clone();
        let progress: ProgressCallback = Arc::new(move |event: ProgressEvent| {
            if let ProgressEvent::FileRestored { path, .. } = event {
                bar.set_message(path);
                bar.tick();
            }
        });

        let options = RestoreOptions {
            strict_paths: self.strict_paths,
        };
        let report = restore_archive(&archive, &target, options, Some(progress)).await?;
        pb.finish_and_clear();

        for path in &report.unsafe_paths {
            warn!("Entry {} was written outside {}", path, target.display());
        }

        println!("✅ Restore completed!");
        println!("📁 Restored: {} files ({})", report.files, format_size(report.bytes));
        if !report.unsafe_paths.is_empty() {
            println!("⚠️  Outside target: {}", report.unsafe_paths.len());
        }
        println!("📂 Location: {}", target.display());

        Ok(())
    }
}
