use crate::hash::hash_file;
use crate::traversal::walk;
use crate::types::{FileEntry, FileRecord, FileStat, Metadata};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Metadata-only change check. Never reads file content.
///
/// A file whose bytes change while size and modification time stay the same
/// is reported unchanged. Use [`ChangeDetection::Checksum`] to catch those.
pub fn quick_changed(old: Option<&FileRecord>, stat: Option<&FileStat>) -> bool {
    let (Some(old), Some(stat)) = (old, stat) else {
        return true;
    };
    old.size != stat.size || old.mtime_ms != stat.mtime_ms
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDetection {
    /// Size and modification time only.
    #[default]
    Quick,
    /// Quick check, then re-hash files the quick check considers unchanged.
    Checksum,
}

/// Outcome of traversal plus change detection for one run.
#[derive(Debug, Default)]
pub struct BackupPlan {
    /// Prior records carried over verbatim.
    pub reused: Vec<FileRecord>,
    /// Files whose bytes go into the new archive, in traversal order.
    pub to_archive: Vec<FileEntry>,
}

impl BackupPlan {
    pub fn files_total(&self) -> usize {
        self.reused.len() + self.to_archive.len()
    }

    pub fn bytes_to_archive(&self) -> u64 {
        self.to_archive.iter().map(|e| e.stat.size).sum()
    }
}

/// Walks `source` and partitions every file into reused or to-archive.
///
/// `previous` is only consulted when `incremental` is set; a full backup
/// archives everything.
pub fn plan<P: AsRef<Path>>(
    source: P,
    previous: Option<&Metadata>,
    incremental: bool,
    detection: ChangeDetection,
) -> Result<BackupPlan> {
    let previous = if incremental { previous } else { None };
    let mut plan = BackupPlan::default();

    for entry in walk(source) {
        let entry = entry?;
        let old = previous.and_then(|m| m.get(&entry.rel_path));

        match old {
            Some(old) if !is_changed(old, &entry, detection)? => {
                debug!(path = %entry.rel_path, "Unchanged, reusing prior record");
                plan.reused.push(old.clone());
            }
            _ => plan.to_archive.push(entry),
        }
    }

    Ok(plan)
}

fn is_changed(old: &FileRecord, entry: &FileEntry, detection: ChangeDetection) -> Result<bool> {
    if quick_changed(Some(old), Some(&entry.stat)) {
        return Ok(true);
    }
    match detection {
        ChangeDetection::Quick => Ok(false),
        ChangeDetection::Checksum => {
            let digest = hash_file(&entry.abs_path)?;
            if digest != old.digest {
                debug!(path = %entry.rel_path, "Content changed without size or mtime change");
            }
            Ok(digest != old.digest)
        }
    }
}
