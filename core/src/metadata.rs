use crate::types::{Metadata, METADATA_FILE};
use crate::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub fn metadata_path<P: AsRef<Path>>(destination: P) -> PathBuf {
    destination.as_ref().join(METADATA_FILE)
}

/// Loads the destination's metadata.
///
/// A missing, unreadable or unparsable file yields `None`: the caller then has
/// no prior generation and falls back to a full backup.
pub async fn read_metadata<P: AsRef<Path>>(destination: P) -> Option<Metadata> {
    let path = metadata_path(destination);
    let data = match fs::read(&path).await {
        Ok(data) => data,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No previous metadata");
            return None;
        }
    };

    match serde_json::from_slice(&data) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unparsable metadata, a full backup follows");
            None
        }
    }
}

/// Persists metadata, replacing any previous file atomically.
///
/// The document is written to a sibling temp file and renamed over the old
/// one, so a failed write leaves the previous generation intact.
pub async fn write_metadata<P: AsRef<Path>>(destination: P, metadata: &Metadata) -> Result<()> {
    let destination = destination.as_ref();
    fs::create_dir_all(destination).await?;

    let path = metadata_path(destination);
    let tmp_path = destination.join(format!("{}.tmp", METADATA_FILE));
    let data = serde_json::to_vec_pretty(metadata)?;

    fs::write(&tmp_path, &data).await?;
    if let Err(e) = fs::rename(&tmp_path, &path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    debug!(path = %path.display(), version = metadata.version, files = metadata.file_count(), "Wrote metadata");
    Ok(())
}
