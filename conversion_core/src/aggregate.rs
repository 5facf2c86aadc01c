//! Regroups the engine's unordered per-segment results into chapter jobs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::progress::{ProgressSink, ProgressState};

/// One synthesized fragment as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentResult {
    #[serde(rename = "output_file")]
    pub fragment_path: PathBuf,
    #[serde(rename = "chapter", default)]
    pub chapter_index: u32,
    #[serde(rename = "progress", default)]
    pub sequence_progress: u64,
    /// Position of the segment inside its chapter. Diagnostic only: fragments
    /// are merged in arrival order.
    #[serde(rename = "segment", default, skip_serializing_if = "Option::is_none")]
    pub segment_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SegmentResult {
    pub fn new(fragment_path: impl Into<PathBuf>, chapter_index: u32, sequence_progress: u64) -> Self {
        Self {
            fragment_path: fragment_path.into(),
            chapter_index,
            sequence_progress,
            segment_index: None,
            error: None,
        }
    }
}

/// Fragments of one chapter, in the order they must be concatenated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterJob {
    pub chapter_index: u32,
    pub fragments: Vec<PathBuf>,
}

/// Group `results` by chapter, ascending by chapter index.
///
/// Publishes `(0, total)` first and then one update per result. The published
/// `completed` value is the running maximum of `sequence_progress`, so
/// observers never see progress go backwards.
pub fn aggregate(
    results: Vec<SegmentResult>,
    total_segments: u64,
    sink: &dyn ProgressSink,
) -> Vec<ChapterJob> {
    let mut chapters: BTreeMap<u32, Vec<PathBuf>> = BTreeMap::new();
    let mut completed = 0u64;
    sink.publish(ProgressState::new(completed, total_segments));

    for result in results {
        if let Some(err) = &result.error {
            warn!(
                chapter = result.chapter_index,
                segment = ?result.segment_index,
                path = %result.fragment_path.display(),
                "Engine reported a failed segment: {err}"
            );
        }

        completed = completed.max(result.sequence_progress);
        sink.publish(ProgressState::new(completed, total_segments));

        chapters
            .entry(result.chapter_index)
            .or_default()
            .push(result.fragment_path);
    }

    debug!(chapters = chapters.len(), completed, total_segments, "Aggregated segment results");

    chapters
        .into_iter()
        .map(|(chapter_index, fragments)| ChapterJob {
            chapter_index,
            fragments,
        })
        .collect()
}
