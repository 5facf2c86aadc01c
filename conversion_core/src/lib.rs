//! Aggregation and merge pipeline turning per-segment TTS fragments into one
//! audio file per document.

pub mod aggregate;
pub mod cancel;
pub mod concat;
pub mod config;
pub mod engine;
pub mod error;
pub mod fragments;
pub mod header;
pub mod lifecycle;
pub mod orchestrator;
pub mod process_engine;
pub mod progress;

pub use aggregate::{aggregate, ChapterJob, SegmentResult};
pub use cancel::CancellationToken;
pub use concat::{merge_files, merge_files_async, MergeOutcome};
pub use config::OrchestratorConfig;
pub use engine::{
    EngineResponse, EngineSettings, SynthesisEngine, SynthesisRequest, Voice, VoiceCatalog,
    VoiceSettings,
};
pub use error::{MergeError, PartialFailure};
pub use header::{FixedHeaderSkip, HeaderSkipPolicy, Id3v2HeaderSkip, NoHeaderSkip};
pub use lifecycle::{BackgroundTaskHandle, KeepAliveState, ProgressSnapshot, TaskHost, TaskStatus};
pub use orchestrator::{chapter_output_path, Orchestrator, RunOutcome, RunReport, RunState};
pub use process_engine::ProcessEngine;
pub use progress::{NoProgress, ProgressSink, ProgressState};
