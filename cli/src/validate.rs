//! Argument checks that run before any command touches the filesystem.

use goback_core::ARCHIVE_EXTENSION;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Source path is required (--source or GOBACK_SOURCE)")]
    MissingSource,

    #[error("Destination path is required (--destination or GOBACK_DESTINATION)")]
    MissingDestination,

    #[error("Source path does not exist: {0}")]
    SourceNotFound(String),

    #[error("Source must be a directory for backup: {0}")]
    SourceNotDirectory(String),

    #[error("Destination exists but is not a directory: {0}")]
    DestinationNotDirectory(String),

    #[error("Backup file does not exist: {0}")]
    ArchiveNotFound(String),

    #[error("Source must be a backup file (.tar.gz), but got a directory: {0}")]
    ArchiveIsDirectory(String),

    #[error("Source must be a .tar.gz backup file: {0}")]
    NotAnArchive(String),

    #[error("Cannot resolve path {path}: {source}")]
    Path {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {reason}")]
    Config { path: String, reason: String },
}

pub fn absolute(path: &Path) -> Result<PathBuf, ValidationError> {
    std::path::absolute(path).map_err(|source| ValidationError::Path {
        path: path.display().to_string(),
        source,
    })
}

pub fn backup_source(path: Option<&Path>) -> Result<PathBuf, ValidationError> {
    let path = absolute(path.ok_or(ValidationError::MissingSource)?)?;
    if !path.exists() {
        return Err(ValidationError::SourceNotFound(path.display().to_string()));
    }
    if !path.is_dir() {
        return Err(ValidationError::SourceNotDirectory(path.display().to_string()));
    }
    Ok(path)
}

/// A directory that is created on demand; it only has to not be a file.
pub fn destination(path: Option<&Path>) -> Result<PathBuf, ValidationError> {
    let path = absolute(path.ok_or(ValidationError::MissingDestination)?)?;
    if path.exists() && !path.is_dir() {
        return Err(ValidationError::DestinationNotDirectory(path.display().to_string()));
    }
    Ok(path)
}

pub fn archive(path: &Path) -> Result<PathBuf, ValidationError> {
    let path = absolute(path)?;
    let display = path.display().to_string();
    if !path.exists() {
        return Err(ValidationError::ArchiveNotFound(display));
    }
    if path.is_dir() {
        return Err(ValidationError::ArchiveIsDirectory(display));
    }
    if !display.ends_with(ARCHIVE_EXTENSION) {
        return Err(ValidationError::NotAnArchive(display));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_backup_source_checks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(backup_source(None), Err(ValidationError::MissingSource)));
        assert!(matches!(
            backup_source(Some(&dir.path().join("missing"))),
            Err(ValidationError::SourceNotFound(_))
        ));
        assert!(matches!(
            backup_source(Some(&file)),
            Err(ValidationError::SourceNotDirectory(_))
        ));
        assert_eq!(backup_source(Some(dir.path())).unwrap(), dir.path());
    }

    #[test]
    fn test_destination_may_be_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        assert!(destination(Some(&dir.path().join("new/dest"))).is_ok());
        assert!(matches!(destination(None), Err(ValidationError::MissingDestination)));
        assert!(matches!(
            destination(Some(&file)),
            Err(ValidationError::DestinationNotDirectory(_))
        ));
    }

    #[test]
    fn test_archive_checks() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("backup-1.tar.gz");
        let wrong = dir.path().join("backup-1.zip");
        let as_dir = dir.path().join("folder.tar.gz");
        fs::write(&good, b"").unwrap();
        fs::write(&wrong, b"").unwrap();
        fs::create_dir(&as_dir).unwrap();

        assert!(archive(&good).is_ok());
        assert!(matches!(archive(&wrong), Err(ValidationError::NotAnArchive(_))));
        assert!(matches!(archive(&as_dir), Err(ValidationError::ArchiveIsDirectory(_))));
        assert!(matches!(
            archive(&dir.path().join("gone.tar.gz")),
            Err(ValidationError::ArchiveNotFound(_))
        ));
    }
}
