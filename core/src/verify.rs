use crate::archive::open_archive;
use crate::hash::HashingReader;
use crate::traversal::normalize_rel_path;
use crate::types::Metadata;
use crate::{Error, Result};
use serde::Serialize;
use std::io;
use std::path::Path;
use tar::EntryType;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub verified: Vec<String>,
    /// Entries whose digest or size disagrees with their record.
    pub mismatched: Vec<String>,
    /// Entries with no record in the metadata.
    pub unknown: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.mismatched.is_empty()
    }
}

pub async fn verify_archive<P: AsRef<Path>>(archive_path: P, metadata: Metadata) -> Result<VerifyReport> {
    let archive_path = archive_path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || verify_blocking(&archive_path, &metadata)).await?
}

/// Re-hashes every file entry of an archive and checks it against `metadata`.
///
/// Metadata only describes the newest generation, so files revised since the
/// verified archive was written show up as mismatches.
pub fn verify_blocking(archive_path: &Path, metadata: &Metadata) -> Result<VerifyReport> {
    let archive_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if let Some(recorded) = &metadata.archive {
        if *recorded != archive_name {
            warn!(
                archive = %archive_name,
                metadata_archive = %recorded,
                "Metadata belongs to a different generation"
            );
        }
    }

    let mut archive = open_archive(archive_path)?;
    let mut report = VerifyReport::default();

    for entry in archive
        .entries()
        .map_err(|e| Error::InvalidArchive(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| Error::InvalidArchive(e.to_string()))?;
        if !matches!(entry.header().entry_type(), EntryType::Regular | EntryType::Continuous) {
            continue;
        }
        let path = normalize_rel_path(
            &entry
                .path()
                .map_err(|e| Error::InvalidArchive(e.to_string()))?,
        );

        let mut hashing = HashingReader::new(&mut entry);
        io::copy(&mut hashing, &mut io::sink()).map_err(|e| Error::entry(path.clone(), e))?;
        let size = hashing.bytes_read();
        let digest = hashing.finalize();

        match metadata.get(&path) {
            Some(record) if record.digest == digest && record.size == size => {
                debug!(path = %path, "Verified");
                report.verified.push(path);
            }
            Some(_) => {
                warn!(path = %path, sha256 = %digest, "Archive entry does not match metadata");
                report.mismatched.push(path);
            }
            None => report.unknown.push(path),
        }
    }

    info!(
        archive = %archive_name,
        verified = report.verified.len(),
        mismatched = report.mismatched.len(),
        unknown = report.unknown.len(),
        "Verification finished"
    );
    Ok(report)
}
