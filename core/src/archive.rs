use crate::hash::HashingReader;
use crate::types::{FileEntry, FileRecord, ARCHIVE_EXTENSION, ARCHIVE_PREFIX};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::{EntryType, Header};
use tracing::debug;

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// `backup-<timestamp>.tar.gz`, with `:` and `.` replaced so the name is safe
/// on every filesystem.
pub fn archive_name(time: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        ARCHIVE_PREFIX,
        time.format("%Y-%m-%dT%H-%M-%S-%3fZ"),
        ARCHIVE_EXTENSION
    )
}

pub fn is_archive_name(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_EXTENSION)
}

/// Streams files into a gzip-compressed tar archive, hashing each file's bytes
/// on the way in.
///
/// Pipeline per entry: file -> [`HashingReader`] -> tar entry -> gzip -> disk.
/// Entries are written strictly one after another.
pub struct ArchiveWriter {
    path: PathBuf,
    builder: tar::Builder<GzEncoder<BufWriter<File>>>,
    entries: usize,
}

impl ArchiveWriter {
    /// Creates the archive file. Never overwrites an existing file.
    pub fn create<P: AsRef<Path>>(path: P, compression_level: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::ArchiveExists {
                    path: path.display().to_string(),
                },
                _ => Error::entry(path.display().to_string(), e),
            })?;

        let encoder = GzEncoder::new(
            BufWriter::new(file),
            Compression::new(compression_level.min(9)),
        );

        Ok(Self {
            path,
            builder: tar::Builder::new(encoder),
            entries: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Appends one file and returns its record.
    ///
    /// The digest is taken only after the tar builder has accepted the whole
    /// entry (header, bytes and padding), so a returned record always describes
    /// bytes that are staged in the archive stream.
    pub fn append(&mut self, entry: &FileEntry) -> Result<FileRecord> {
        let file = File::open(&entry.abs_path)
            .map_err(|e| Error::entry(entry.abs_path.display().to_string(), e))?;
        let mut reader = HashingReader::new(file.take(entry.stat.size));

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(entry.stat.size);
        header.set_mode(entry.stat.mode);
        header.set_mtime(entry.stat.mtime_secs());

        self.builder
            .append_data(&mut header, &entry.rel_path, &mut reader)
            .map_err(|e| Error::entry(entry.rel_path.clone(), e))?;

        if reader.bytes_read() != entry.stat.size {
            return Err(Error::SizeMismatch {
                path: entry.rel_path.clone(),
                expected: entry.stat.size,
                actual: reader.bytes_read(),
            });
        }

        self.entries += 1;
        let record = FileRecord::new(entry, reader.finalize());
        debug!(path = %record.path, size = record.size, sha256 = %record.digest, "Archived file");
        Ok(record)
    }

    /// Writes the tar trailer, flushes gzip and syncs the file to disk.
    pub fn finish(self) -> Result<()> {
        let path = self.path.display().to_string();
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| Error::entry(path.clone(), e))?;
        let mut writer = encoder.finish().map_err(|e| Error::entry(path.clone(), e))?;
        writer.flush().map_err(|e| Error::entry(path.clone(), e))?;
        let file = writer
            .into_inner()
            .map_err(|e| Error::entry(path.clone(), e.into_error()))?;
        file.sync_all().map_err(|e| Error::entry(path, e))?;
        Ok(())
    }
}

pub type ArchiveReader = tar::Archive<GzDecoder<BufReader<File>>>;

/// Opens an archive for sequential reading: file -> gunzip -> tar entries.
pub fn open_archive<P: AsRef<Path>>(archive_path: P) -> Result<ArchiveReader> {
    let path = archive_path.as_ref();
    let file = File::open(path).map_err(|e| Error::entry(path.display().to_string(), e))?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// Writes `entries` into a new archive at `archive_path`.
///
/// Returns the fresh records in archive order. `on_record` sees each record as
/// soon as its entry is complete. Any failure aborts the archive; the partial
/// file is left on disk.
pub fn write_archive<'a, P, I, F>(
    archive_path: P,
    entries: I,
    compression_level: u32,
    mut on_record: F,
) -> Result<Vec<FileRecord>>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a FileEntry>,
    F: FnMut(&FileRecord),
{
    let mut writer = ArchiveWriter::create(archive_path, compression_level)?;
    let mut records = Vec::new();

    for entry in entries {
        let record = writer.append(entry)?;
        on_record(&record);
        records.push(record);
    }

    writer.finish()?;
    Ok(records)
}
