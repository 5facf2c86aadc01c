//! Common utilities for conversion_core integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conversion_core::{
    EngineResponse, ProgressSink, ProgressState, SegmentResult, SynthesisEngine,
    SynthesisRequest, VoiceCatalog,
};

/// Write a file of `len` bytes whose content is `fill` repeated.
pub fn write_fragment(dir: &Path, name: &str, len: usize, fill: u8) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![fill; len]).unwrap();
    path
}

pub fn request(output: &Path) -> SynthesisRequest {
    SynthesisRequest {
        text: r#"["Chapitre un.", "Chapitre deux.", "Chapitre trois."]"#.to_string(),
        voice_id: "fr-FR-HenriNeural".to_string(),
        output_path: output.to_path_buf(),
        settings: Default::default(),
    }
}

/// Scripted engine used to drive the orchestrator deterministically.
pub enum FakeEngine {
    /// Answers with this batch.
    Respond(EngineResponse),
    /// Reports a transport error.
    Error(String),
    /// Never answers.
    Hang,
    /// Answers after a delay.
    Slow(Duration, EngineResponse),
}

#[async_trait]
impl SynthesisEngine for FakeEngine {
    async fn synthesize(&self, _request: &SynthesisRequest) -> anyhow::Result<EngineResponse> {
        match self {
            FakeEngine::Respond(response) => Ok(response.clone()),
            FakeEngine::Error(message) => Err(anyhow::anyhow!(message.clone())),
            FakeEngine::Hang => std::future::pending().await,
            FakeEngine::Slow(delay, response) => {
                tokio::time::sleep(*delay).await;
                Ok(response.clone())
            }
        }
    }

    async fn list_voices(&self) -> anyhow::Result<VoiceCatalog> {
        Ok(VoiceCatalog::default())
    }

    async fn check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn completed(results: Vec<SegmentResult>, total_segments: u64) -> EngineResponse {
    EngineResponse::Completed {
        results,
        total_segments,
    }
}

/// Records every published progress state.
#[derive(Default, Clone)]
pub struct RecordingSink {
    pub states: Arc<Mutex<Vec<ProgressState>>>,
}

impl RecordingSink {
    pub fn snapshot(&self) -> Vec<ProgressState> {
        self.states.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, state: ProgressState) {
        self.states.lock().unwrap().push(state);
    }
}

/// Every file left in `dir`, sorted.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}
