//! Byte-stream concatenation of audio fragments.
//!
//! This is a structural merge: no decoding, no re-encoding. The first input is
//! copied whole, every later input loses the prefix chosen by the
//! [`HeaderSkipPolicy`]. Inputs are deleted once their bytes are written.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{MergeError, PartialFailure};
use crate::fragments;
use crate::header::HeaderSkipPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Bytes transferred across all inputs. Diagnostic only.
    pub total_bytes_written: u64,
    /// Size of the output file once the merge finished; always > 0.
    pub final_size: u64,
    /// Inputs that were folded into the output, in merge order.
    pub merged: Vec<PathBuf>,
    /// Missing inputs and failed deletions.
    pub dropped: Vec<PartialFailure>,
}

/// Concatenate `inputs` into `output`.
///
/// Missing inputs are skipped; if none exist the call fails with
/// [`MergeError::NoInputFiles`] before `output` is created. A transfer error
/// aborts the merge and leaves `output` partially written; inputs already
/// consumed stay deleted.
pub fn merge_files(
    inputs: &[PathBuf],
    output: &Path,
    policy: &dyn HeaderSkipPolicy,
) -> Result<MergeOutcome, MergeError> {
    info!(
        inputs = inputs.len(),
        output = %output.display(),
        "Merging audio files"
    );

    let mut dropped = Vec::new();
    let existing: Vec<&PathBuf> = inputs
        .iter()
        .filter(|path| {
            if fragments::exists(path) {
                true
            } else {
                warn!(path = %path.display(), "Input file missing, skipping");
                dropped.push(PartialFailure::MissingInput {
                    path: path.to_path_buf(),
                });
                false
            }
        })
        .collect();

    if existing.is_empty() {
        return Err(MergeError::NoInputFiles);
    }

    for path in &existing {
        debug!(
            path = %path.display(),
            size = fragments::size(path).unwrap_or(0),
            "Input file size"
        );
    }

    let file = File::create(output).map_err(|e| MergeError::io(output, e))?;
    let mut writer = BufWriter::new(file);
    let mut total_bytes_written = 0u64;
    let mut merged = Vec::with_capacity(existing.len());

    for (index, input) in existing.into_iter().enumerate() {
        let written = append_input(input, index == 0, &mut writer, policy)?;
        writer.flush().map_err(|e| MergeError::io(output, e))?;
        total_bytes_written += written;
        debug!(path = %input.display(), written, "Appended input");

        merged.push(input.clone());
        if let Some(failure) = fragments::remove_consumed(input) {
            dropped.push(failure);
        }
    }

    writer
        .into_inner()
        .map_err(|e| MergeError::io(output, e.into_error()))?
        .sync_all()
        .map_err(|e| MergeError::io(output, e))?;

    let final_size = fragments::size(output).unwrap_or(0);
    info!(
        output = %output.display(),
        final_size,
        total_bytes_written,
        "Merge finished"
    );

    if final_size == 0 {
        return Err(MergeError::EmptyMergeResult {
            path: output.to_path_buf(),
        });
    }

    Ok(MergeOutcome {
        total_bytes_written,
        final_size,
        merged,
        dropped,
    })
}

/// Run [`merge_files`] on the blocking pool.
pub async fn merge_files_async(
    inputs: Vec<PathBuf>,
    output: PathBuf,
    policy: Arc<dyn HeaderSkipPolicy>,
) -> Result<MergeOutcome, MergeError> {
    tokio::task::spawn_blocking(move || merge_files(&inputs, &output, policy.as_ref()))
        .await
        .map_err(|e| MergeError::Join(e.to_string()))?
}

fn append_input<W: Write>(
    input: &Path,
    is_first: bool,
    writer: &mut W,
    policy: &dyn HeaderSkipPolicy,
) -> Result<u64, MergeError> {
    let mut file = File::open(input).map_err(|e| MergeError::io(input, e))?;
    let file_len = file
        .metadata()
        .map_err(|e| MergeError::io(input, e))?
        .len();

    let position = if is_first {
        0
    } else {
        policy
            .skip_len(input, file_len)
            .map_err(|e| MergeError::io(input, e))?
            .min(file_len)
    };
    debug!(
        path = %input.display(),
        file_len,
        position,
        "Copying input"
    );

    file.seek(SeekFrom::Start(position))
        .map_err(|e| MergeError::io(input, e))?;
    io::copy(&mut file.take(file_len - position), writer).map_err(|e| MergeError::io(input, e))
}
