use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a single merge call.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no input file to merge exists")]
    NoInputFiles,

    #[error("merged file {} is empty", path.display())]
    EmptyMergeResult { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("merge task failed: {0}")]
    Join(String),
}

impl MergeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Something the pipeline dropped without failing the surrounding operation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartialFailure {
    /// An input path did not exist when its merge started.
    MissingInput { path: PathBuf },
    /// A consumed input could not be removed afterwards.
    DeleteFailed { path: PathBuf, reason: String },
    /// A chapter could not be merged and was left out of the final file.
    ChapterMergeFailed { chapter_index: u32, reason: String },
}

impl std::fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartialFailure::MissingInput { path } => {
                write!(f, "missing input {}", path.display())
            }
            PartialFailure::DeleteFailed { path, reason } => {
                write!(f, "could not delete {}: {reason}", path.display())
            }
            PartialFailure::ChapterMergeFailed {
                chapter_index,
                reason,
            } => write!(f, "chapter {chapter_index} dropped: {reason}"),
        }
    }
}
