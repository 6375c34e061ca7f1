use std::sync::Arc;

/// Milestones reported while a backup or restore runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Planned {
        files_total: usize,
        files_to_archive: usize,
        bytes_to_archive: u64,
    },
    FileArchived { path: String, bytes: u64 },
    FileRestored { path: String, bytes: u64 },
    ArchiveDeleted { name: String },
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

pub(crate) fn report(progress: Option<&ProgressCallback>, event: ProgressEvent) {
    if let Some(callback) = progress {
        callback(event);
    }
}
