mod commands;
mod config;
mod validate;

use clap::{Parser, Subcommand};
use commands::{backup::BackupCommand, list::ListCommand, restore::RestoreCommand, verify::VerifyCommand};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use validate::ValidationError;

const EXIT_INVALID_INPUT: u8 = 1;
const EXIT_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(
    name = "goback",
    version,
    about = "Point-in-time archive backups with incremental change detection",
    long_about = "Goback packs a directory tree into timestamped .tar.gz archives, records a SHA-256 per file, \
                  skips unchanged files on incremental runs and prunes archives past their retention age"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "GOBACK_CONFIG", help = "Config file (TOML)")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new backup archive")]
    Backup(BackupCommand),

    #[command(
        about = "Restore an archive into a directory",
        long_about = "Restores exactly the files stored in ARCHIVE. An incremental archive only holds files \
                      that changed since the previous run; unchanged files live in older archives."
    )]
    Restore(RestoreCommand),

    #[command(about = "Check archive contents against the destination metadata")]
    Verify(VerifyCommand),

    #[command(about = "List archives and the current metadata of a destination")]
    List(ListCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(EXIT_INVALID_INPUT);
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_INPUT);
        }
    };

    init_tracing(cli.verbose, cli.quiet, config.log.level.as_deref());
    debug!(config = ?config, "Loaded configuration");

    let result = match &cli.command {
        Commands::Backup(cmd) => cmd.run(&cli, &config).await,
        Commands::Restore(cmd) => cmd.run(&cli).await,
        Commands::Verify(cmd) => cmd.run(&cli).await,
        Commands::List(cmd) => cmd.run(&cli).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.downcast_ref::<ValidationError>().is_some() => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_INVALID_INPUT)
        }
        Err(e) => {
            eprintln!("{} failed: {:#}", cli.command.name(), e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Backup(_) => "backup",
            Commands::Restore(_) => "restore",
            Commands::Verify(_) => "verify",
            Commands::List(_) => "list",
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool, configured: Option<&str>) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        configured.unwrap_or("info")
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("goback={level},goback_core={level}")));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default subscriber failed");
}
