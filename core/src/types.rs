use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reserved filename of the metadata document inside a destination.
pub const METADATA_FILE: &str = ".goback-meta.json";
pub const ARCHIVE_PREFIX: &str = "backup-";
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Filesystem facts captured for one regular file during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime_ms: i64,
    pub mode: u32,
}

impl FileStat {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> std::io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            mtime_ms: system_time_to_millis(metadata.modified()?),
            mode: permission_bits(metadata),
        })
    }

    /// Modification time in whole seconds, the resolution tar headers carry.
    pub fn mtime_secs(&self) -> u64 {
        self.mtime_ms.max(0) as u64 / 1000
    }
}

/// A regular file yielded by traversal.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the backup root, always with `/` separators.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub stat: FileStat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    #[serde(rename = "mtimeMs", deserialize_with = "deserialize_millis")]
    pub mtime_ms: i64,
    #[serde(rename = "sha256")]
    pub digest: String,
    pub mode: u32,
}

impl FileRecord {
    pub fn new(entry: &FileEntry, digest: String) -> Self {
        Self {
            path: entry.rel_path.clone(),
            size: entry.stat.size,
            mtime_ms: entry.stat.mtime_ms,
            digest,
            mode: entry.stat.mode,
        }
    }
}

/// One generation's view of the backed-up tree, keyed by relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub files: HashMap<String, FileRecord>,
    /// Archive written by the generation that produced this metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
}

impl Metadata {
    pub fn new(created_at: DateTime<Utc>, version: u64) -> Self {
        Self {
            created_at,
            version,
            files: HashMap::new(),
            archive: None,
        }
    }

    /// Starts the generation following `previous`, or generation 1.
    pub fn next_generation(previous: Option<&Metadata>, created_at: DateTime<Utc>) -> Self {
        let version = previous.map(|m| m.version + 1).unwrap_or(1);
        Self::new(created_at, version)
    }

    pub fn insert(&mut self, record: FileRecord) {
        self.files.insert(record.path.clone(), record);
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_size(&self) -> u64 {
        self.files.values().map(|r| r.size).sum()
    }
}

pub fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

// Older metadata files carry fractional milliseconds.
fn deserialize_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    number
        .as_i64()
        .or_else(|| number.as_f64().map(|f| f.trunc() as i64))
        .ok_or_else(|| serde::de::Error::custom("mtimeMs is not a valid timestamp"))
}
