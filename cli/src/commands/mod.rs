pub mod backup;
pub mod list;
pub mod restore;
pub mod verify;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

/// Bar used by backup and restore; hidden in quiet mode.
pub fn progress_bar(cli: &crate::Cli, len: u64) -> Result<ProgressBar> {
    if cli.quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len);
    pb.set_style(ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")?);
    Ok(pb)
}

pub fn spinner(cli: &crate::Cli, message: &'static str) -> Result<ProgressBar> {
    if cli.quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(message);
    Ok(pb)
}

pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}
