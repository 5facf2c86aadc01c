//! Filesystem accessors for synthesized fragments and intermediate files.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::PartialFailure;

/// Whether `path` currently exists as a regular file.
pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Size in bytes, `None` if the file cannot be inspected.
pub fn size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|meta| meta.len())
}

/// Remove a consumed file. Failures are logged and handed back as a
/// [`PartialFailure::DeleteFailed`] instead of an error.
pub fn remove_consumed(path: &Path) -> Option<PartialFailure> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed consumed file");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), "Could not remove consumed file: {e}");
            Some(PartialFailure::DeleteFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    }
}
