//! End-to-end conversion run: wait for the engine, regroup, merge, clean up.
//!
//! ```text
//! Idle -> AwaitingSynthesis -> Aggregating -> MergingChapters -> MergingFinal -> Done
//!               |  timeout / cancel / engine failure ------------------------> Done
//! ```
//!
//! Only the wait for the engine can be interrupted. Once aggregation starts the
//! run always reaches `Done` on its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::aggregate::{aggregate, ChapterJob};
use crate::cancel::CancellationToken;
use crate::concat::merge_files_async;
use crate::config::OrchestratorConfig;
use crate::engine::{EngineResponse, SynthesisEngine, SynthesisRequest};
use crate::error::PartialFailure;
use crate::fragments;
use crate::progress::ProgressSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    AwaitingSynthesis,
    Aggregating,
    MergingChapters,
    MergingFinal,
    Done,
}

/// Terminal result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    Success(PathBuf),
    TimedOut,
    MergeFailed(String),
    SynthesisFailed(String),
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    /// Stable code callers surface for a failed run.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            RunOutcome::Success(_) => None,
            RunOutcome::TimedOut => Some("TIMEOUT_ERROR"),
            RunOutcome::MergeFailed(_) => Some("MERGE_ERROR"),
            RunOutcome::SynthesisFailed(_) => Some("SYNTHESIS_ERROR"),
            RunOutcome::Cancelled => Some("CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Every state the run went through, `Done` last.
    pub states: Vec<RunState>,
    /// What was left out along the way without failing the run.
    pub dropped: Vec<PartialFailure>,
    /// Chapters whose own merge succeeded, in final-file order.
    pub chapters_merged: Vec<u32>,
    pub final_size: Option<u64>,
}

/// `"<output>_chapter_<index>.<ext>"`
pub fn chapter_output_path(output: &Path, chapter_index: u32, extension: &str) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(format!("_chapter_{chapter_index}.{extension}"));
    PathBuf::from(name)
}

struct RunTracker {
    states: Vec<RunState>,
    dropped: Vec<PartialFailure>,
    chapters_merged: Vec<u32>,
    final_size: Option<u64>,
    started: Instant,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            states: vec![RunState::Idle],
            dropped: Vec::new(),
            chapters_merged: Vec::new(),
            final_size: None,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, state: RunState) {
        info!(?state, elapsed_ms = self.started.elapsed().as_millis() as u64, "Run state changed");
        self.states.push(state);
    }

    fn finish(mut self, outcome: RunOutcome) -> RunReport {
        self.enter(RunState::Done);
        match &outcome {
            RunOutcome::Success(path) => info!(
                output = %path.display(),
                chapters = self.chapters_merged.len(),
                dropped = self.dropped.len(),
                "Conversion finished"
            ),
            other => error!(outcome = ?other, "Conversion failed"),
        }
        RunReport {
            outcome,
            states: self.states,
            dropped: self.dropped,
            chapters_merged: self.chapters_merged,
            final_size: self.final_size,
        }
    }
}

pub struct Orchestrator {
    engine: Arc<dyn SynthesisEngine>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn SynthesisEngine>, config: OrchestratorConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Execute one run. Exactly one [`RunOutcome`] comes back, inside the report.
    pub async fn run(
        &self,
        request: SynthesisRequest,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
    ) -> RunReport {
        let mut tracker = RunTracker::new();
        tracker.enter(RunState::AwaitingSynthesis);
        info!(
            voice = %request.voice_id,
            output = %request.output_path.display(),
            timeout_secs = self.config.synthesis_timeout.as_secs(),
            "Starting conversion"
        );

        if cancel.is_cancelled() {
            warn!("Conversion cancelled before synthesis started");
            return tracker.finish(RunOutcome::Cancelled);
        }

        // Dropping the engine future on timeout or cancel aborts the engine call.
        // Cancel is polled first so a stop never loses to a ready engine.
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Conversion cancelled while waiting for synthesis");
                return tracker.finish(RunOutcome::Cancelled);
            }
            waited = tokio::time::timeout(
                self.config.synthesis_timeout,
                self.engine.synthesize(&request),
            ) => waited,
        };

        let (results, total_segments) = match response {
            Err(_) => {
                error!(
                    timeout_secs = self.config.synthesis_timeout.as_secs(),
                    "Synthesis timed out"
                );
                return tracker.finish(RunOutcome::TimedOut);
            }
            Ok(Err(e)) => {
                return tracker.finish(RunOutcome::SynthesisFailed(format!("{e:#}")));
            }
            Ok(Ok(EngineResponse::Failed { diagnostic })) => {
                return tracker.finish(RunOutcome::SynthesisFailed(diagnostic));
            }
            Ok(Ok(EngineResponse::Completed {
                results,
                total_segments,
            })) => (results, total_segments),
        };

        tracker.enter(RunState::Aggregating);
        info!(results = results.len(), total_segments, "Synthesis completed");
        let jobs = aggregate(results, total_segments, sink);

        tracker.enter(RunState::MergingChapters);
        let chapter_files = self.merge_chapters(&request.output_path, jobs, &mut tracker).await;

        tracker.enter(RunState::MergingFinal);
        let outcome = match merge_files_async(
            chapter_files.clone(),
            request.output_path.clone(),
            self.config.header_policy.clone(),
        )
        .await
        {
            Ok(merge) => {
                tracker.dropped.extend(merge.dropped);
                tracker.final_size = Some(merge.final_size);
                RunOutcome::Success(request.output_path.clone())
            }
            Err(e) => {
                error!("Final merge failed: {e}");
                RunOutcome::MergeFailed(e.to_string())
            }
        };

        // The final merge deletes what it consumed; whatever is left goes now.
        for path in chapter_files.iter().filter(|p| fragments::exists(p)) {
            if let Some(failure) = fragments::remove_consumed(path) {
                tracker.dropped.push(failure);
            }
        }

        tracker.finish(outcome)
    }

    /// Merge each chapter in ascending order. Failed chapters are recorded and
    /// left out; the returned paths are the chapter files that exist.
    async fn merge_chapters(
        &self,
        output: &Path,
        jobs: Vec<ChapterJob>,
        tracker: &mut RunTracker,
    ) -> Vec<PathBuf> {
        let mut chapter_files = Vec::with_capacity(jobs.len());

        for job in jobs {
            let chapter_path =
                chapter_output_path(output, job.chapter_index, &self.config.chapter_extension);
            info!(
                chapter = job.chapter_index,
                fragments = job.fragments.len(),
                "Merging chapter"
            );

            match merge_files_async(
                job.fragments,
                chapter_path.clone(),
                self.config.header_policy.clone(),
            )
            .await
            {
                Ok(merge) => {
                    tracker.dropped.extend(merge.dropped);
                    tracker.chapters_merged.push(job.chapter_index);
                    chapter_files.push(chapter_path);
                }
                Err(e) => {
                    error!(chapter = job.chapter_index, "Chapter merge failed: {e}");
                    tracker.dropped.push(PartialFailure::ChapterMergeFailed {
                        chapter_index: job.chapter_index,
                        reason: e.to_string(),
                    });
                    if fragments::exists(&chapter_path) {
                        if let Some(failure) = fragments::remove_consumed(&chapter_path) {
                            tracker.dropped.push(failure);
                        }
                    }
                }
            }
        }

        chapter_files
    }
}
