use crate::types::{FileEntry, FileStat};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

/// Lazy, single-pass walk over every regular file below a root.
///
/// Symlinks are not followed. Symlinks, devices, sockets and fifos are skipped
/// without error. The first directory listing or stat failure is yielded as an
/// `Err` and the caller is expected to stop there. Order is unspecified.
/// Calling [`walk`] again starts a fresh walk.
pub struct Walker {
    root: PathBuf,
    inner: walkdir::IntoIter,
}

pub fn walk<P: AsRef<Path>>(root: P) -> Walker {
    let root = root.as_ref().to_path_buf();
    let inner = WalkDir::new(&root)
        .follow_links(false)
        .min_depth(1)
        .into_iter();
    Walker { root, inner }
}

impl Walker {
    fn to_entry(&self, entry: walkdir::DirEntry) -> Result<FileEntry> {
        let abs_path = entry.path().to_path_buf();
        let metadata = entry
            .metadata()
            .map_err(|e| walk_error(e, &abs_path))?;
        let stat = FileStat::from_metadata(&metadata)
            .map_err(|e| Error::entry(abs_path.display().to_string(), e))?;
        let rel = abs_path.strip_prefix(&self.root).map_err(|_| {
            Error::Other(format!(
                "{} is not under {}",
                abs_path.display(),
                self.root.display()
            ))
        })?;

        Ok(FileEntry {
            rel_path: normalize_rel_path(rel),
            abs_path,
            stat,
        })
    }
}

impl Iterator for Walker {
    type Item = Result<FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    return Some(Err(walk_error(e, &path)));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_file() {
                return Some(self.to_entry(entry));
            }
            if !file_type.is_dir() {
                trace!(path = %entry.path().display(), "Skipping non-regular file");
            }
        }
    }
}

/// Joins path components with `/` regardless of the host separator.
pub fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(error: walkdir::Error, path: &Path) -> Error {
    let path = path.display().to_string();
    match error.into_io_error() {
        Some(source) => Error::entry(path, source),
        None => Error::Other(format!("Filesystem loop detected at {}", path)),
    }
}
