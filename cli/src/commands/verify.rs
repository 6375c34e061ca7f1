use super::spinner;
use crate::validate;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use goback_core::metadata::read_metadata;
use goback_core::{verify_archive, Metadata};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct VerifyCommand {
    #[arg(help = "Archive to verify (.tar.gz)")]
    archive: PathBuf,

    #[arg(long, help = "Metadata file to check against (defaults to the one next to the archive)")]
    metadata: Option<PathBuf>,

    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

impl VerifyCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let archive = validate::archive(&self.archive)?;

        let metadata = match &self.metadata {
            Some(path) => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str::<Metadata>(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            }
            None => {
                let destination = archive
                    .parent()
                    .ok_or_else(|| anyhow!("Archive has no parent directory"))?;
                read_metadata(destination)
                    .await
                    .ok_or_else(|| anyhow!("No metadata found in {}", destination.display()))?
            }
        };

        info!("Verifying {} against version {}", archive.display(), metadata.version);

        let pb = spinner(cli, "Verifying...")?;
        let report = verify_archive(&archive, metadata).await?;
        pb.finish_and_clear();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("✅ Verified: {}", report.verified.len());
            for path in &report.mismatched {
                println!("❌ Mismatch: {}", path);
            }
            for path in &report.unknown {
                println!("❓ Not in metadata: {}", path);
            }
        }

        if !report.is_ok() {
            return Err(anyhow!("{} entries do not match the metadata", report.mismatched.len()));
        }
        Ok(())
    }
}
