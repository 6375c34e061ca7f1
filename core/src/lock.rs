use crate::{Error, Result};
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub const LOCK_FILE: &str = ".goback.lock";

/// Advisory lock held on a destination for the duration of a backup run.
///
/// Removed on drop. A lock left behind by a crashed process has to be
/// deleted by hand.
#[derive(Debug)]
pub struct DestinationLock {
    path: PathBuf,
}

impl DestinationLock {
    pub async fn acquire<P: AsRef<Path>>(destination: P) -> Result<Self> {
        let path = destination.as_ref().join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::LockConflict(format!(
                    "another run holds {} (delete it if no backup is running)",
                    path.display()
                )),
                _ => Error::Io(e),
            })?;

        let lock = Self { path };
        let owner = format!("pid={}\nstarted={}\n", std::process::id(), Utc::now().to_rfc3339());
        file.write_all(owner.as_bytes()).await?;
        file.flush().await?;

        debug!(lock = %lock.path.display(), "Acquired destination lock");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DestinationLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to release destination lock");
        }
    }
}
