//! Archive restore: file -> gunzip -> tar entries -> files on disk.
//!
//! Restoring one archive reproduces exactly the files that archive contains.
//! An incremental archive only carries files that changed since the previous
//! generation, so restoring it alone does not rebuild the whole tree.

use crate::archive::open_archive;
use crate::progress::{report, ProgressCallback, ProgressEvent};
use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tar::EntryType;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Reject entries that are absolute or contain `..` instead of only
    /// warning about them.
    pub strict_paths: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    /// Entry names that point outside the output directory.
    pub unsafe_paths: Vec<String>,
}

pub async fn restore_archive<A, O>(
    archive_path: A,
    output_dir: O,
    options: RestoreOptions,
    progress: Option<ProgressCallback>,
) -> Result<RestoreReport>
where
    A: AsRef<Path>,
    O: AsRef<Path>,
{
    let archive_path = archive_path.as_ref().to_path_buf();
    let output_dir = output_dir.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || {
        restore_blocking(&archive_path, &output_dir, options, progress.as_ref())
    })
    .await?
}

/// Restores every entry of `archive_path` below `output_dir`, one at a time.
///
/// The first failing entry aborts the restore; files already written stay.
pub fn restore_blocking(
    archive_path: &Path,
    output_dir: &Path,
    options: RestoreOptions,
    progress: Option<&ProgressCallback>,
) -> Result<RestoreReport> {
    fs::create_dir_all(output_dir).map_err(|e| Error::entry(output_dir.display().to_string(), e))?;

    let mut archive = open_archive(archive_path)?;
    let entries = archive
        .entries()
        .map_err(|e| Error::InvalidArchive(e.to_string()))?;
    let mut restored = RestoreReport::default();

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::InvalidArchive(e.to_string()))?;
        let name: PathBuf = entry
            .path()
            .map_err(|e| Error::InvalidArchive(e.to_string()))?
            .into_owned();
        let entry_name = name.display().to_string();

        if escapes_root(&name) {
            if options.strict_paths {
                return Err(Error::UnsafeEntryPath { path: entry_name });
            }
            warn!(path = %entry_name, "Archive entry points outside the output directory");
            restored.unsafe_paths.push(entry_name.clone());
        }

        let target = output_dir.join(&name);
        let entry_type = entry.header().entry_type();
        match entry_type {
            EntryType::Regular | EntryType::Continuous => {
                let bytes = restore_file(&mut entry, &target).map_err(|e| Error::entry(entry_name.clone(), e))?;
                restored.files += 1;
                restored.bytes += bytes;
                debug!(path = %entry_name, bytes, "Restored file");
                report(progress, ProgressEvent::FileRestored { path: entry_name, bytes });
            }
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(|e| Error::entry(entry_name, e))?;
                restored.directories += 1;
            }
            other => {
                debug!(path = %entry_name, entry_type = ?other, "Skipping non-regular entry");
            }
        }
    }

    info!(
        archive = %archive_path.display(),
        files = restored.files,
        bytes = restored.bytes,
        "Restore finished"
    );
    Ok(restored)
}

fn restore_file<R: Read>(entry: &mut tar::Entry<'_, R>, target: &Path) -> io::Result<u64> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(target)?;
    let bytes = io::copy(entry, &mut file)?;

    let header = entry.header();
    let mtime = header.mtime()?;
    file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime))?;
    drop(file);

    set_mode(target, header.mode()?)?;
    Ok(bytes)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, permissions)
}

fn escapes_root(name: &Path) -> bool {
    name.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
