pub mod archive;
pub mod backup;
pub mod error;
pub mod hash;
pub mod incremental;
pub mod lock;
pub mod metadata;
pub mod progress;
pub mod restore;
pub mod retention;
pub mod traversal;
pub mod types;
pub mod verify;

pub use backup::{BackupEngine, BackupOptions, BackupReport};
pub use error::{Error, Result};
pub use incremental::{quick_changed, ChangeDetection};
pub use progress::{ProgressCallback, ProgressEvent};
pub use restore::{restore_archive, RestoreOptions, RestoreReport};
pub use types::*;
pub use verify::{verify_archive, VerifyReport};
