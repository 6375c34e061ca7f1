use super::format_size;
use crate::validate;
use anyhow::Result;
use clap::{Args, ValueEnum};
use goback_core::metadata::read_metadata;
use goback_core::retention::list_archives;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ListCommand {
    #[arg(env = "GOBACK_DESTINATION", help = "Destination directory")]
    destination: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table, help = "Output format")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct Listing<'a> {
    archives: &'a [goback_core::retention::ArchiveInfo],
    version: Option<u64>,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    files: Option<usize>,
    latest: Option<&'a str>,
}

impl ListCommand {
    pub async fn run(&self, _cli: &crate::Cli) -> Result<()> {
        let destination = validate::destination(self.destination.as_deref())?;
        if !destination.is_dir() {
            println!("No backups found");
            return Ok(());
        }

        info!("Listing archives in {}", destination.display());
        let archives = list_archives(&destination).await?;
        let metadata = read_metadata(&destination).await;

        match self.format {
            OutputFormat::Table => {
                if archives.is_empty() {
                    println!("No backups found");
                } else {
                    println!("{:<40} {:<20} {:>12}", "Archive", "Date", "Size");
                    println!("{:-<74}", "");
                    for archive in &archives {
                        println!(
                            "{:<40} {:<20} {:>12}",
                            archive.name,
                            archive.modified.format("%Y-%m-%d %H:%M:%S"),
                            format_size(archive.size)
                        );
                    }
                }

                if let Some(metadata) = &metadata {
                    println!();
                    println!("🔢 Version: {}", metadata.version);
                    println!("🕒 Created: {}", metadata.created_at.format("%Y-%m-%d %H:%M:%S"));
                    println!("📁 Files: {} ({})", metadata.file_count(), format_size(metadata.total_size()));
                    if let Some(latest) = &metadata.archive {
                        println!("📦 Latest: {}", latest);
                    }
                }
            }
            OutputFormat::Json => {
                let listing = Listing {
                    archives: &archives,
                    version: metadata.as_ref().map(|m| m.version),
                    created_at: metadata.as_ref().map(|m| m.created_at),
                    files: metadata.as_ref().map(|m| m.file_count()),
                    latest: metadata.as_ref().and_then(|m| m.archive.as_deref()),
                };
                println!("{}", serde_json::to_string_pretty(&listing)?);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_format_is_checked_while_parsing() {
        let cli = Cli::try_parse_from(["goback", "list", "dest", "--format", "json"]).unwrap();
        match cli.command {
            Commands::List(cmd) => assert_eq!(cmd.format, OutputFormat::Json),
            _ => panic!("expected list command"),
        }

        let cli = Cli::try_parse_from(["goback", "list", "dest"]).unwrap();
        match cli.command {
            Commands::List(cmd) => assert_eq!(cmd.format, OutputFormat::Table),
            _ => panic!("expected list command"),
        }

        assert!(Cli::try_parse_from(["goback", "list", "dest", "--format", "xml"]).is_err());
    }
}
