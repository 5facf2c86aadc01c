//! Boundary to the external text-to-speech engine.
//!
//! The engine is opaque: it receives the whole document text, a voice and an
//! output prefix, and answers with a JSON batch describing every fragment it
//! wrote. Anything implementing [`SynthesisEngine`] can drive a run, which is
//! how tests inject fakes.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::SegmentResult;

/// Prosody settings, forwarded verbatim (`"+10%"`, `"-5Hz"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub rate: String,
    pub volume: String,
    pub pitch: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: "+0%".to_string(),
            volume: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
        }
    }
}

/// Engine tuning knobs. The pipeline never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub max_parallel_chapters: u32,
    pub voice_settings: VoiceSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_parallel_chapters: 3,
            voice_settings: VoiceSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Plain text, or a JSON array of chapter texts.
    pub text: String,
    pub voice_id: String,
    #[serde(rename = "output_file")]
    pub output_path: PathBuf,
    #[serde(default)]
    pub settings: EngineSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineResponse {
    Completed {
        results: Vec<SegmentResult>,
        total_segments: u64,
    },
    /// The engine ran but reported failure; `diagnostic` is its raw answer.
    Failed { diagnostic: String },
}

impl EngineResponse {
    /// Parse the engine's JSON answer.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let json: serde_json::Value =
            serde_json::from_str(raw).context("engine response is not valid JSON")?;

        let success = json
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !success {
            return Ok(EngineResponse::Failed {
                diagnostic: raw.trim().to_string(),
            });
        }

        let entries = json
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("engine response has no 'results' array"))?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.get("output_file").is_none() {
                debug!("Skipping engine result without output_file: {entry}");
                continue;
            }
            let result: SegmentResult = serde_json::from_value(entry.clone())
                .with_context(|| format!("invalid segment result: {entry}"))?;
            results.push(result);
        }

        let total_segments = json
            .get("total_segments")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        Ok(EngineResponse::Completed {
            results,
            total_segments,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Voice {
    pub name: String,
    pub short_name: String,
    pub gender: String,
    pub locale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCatalog {
    pub voices: Vec<Voice>,
}

impl VoiceCatalog {
    /// Parse `{ "voices": [...] }`; `{ "error": "..." }` becomes an `Err`.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let json: serde_json::Value =
            serde_json::from_str(raw).context("voice catalog is not valid JSON")?;
        if let Some(error) = json.get("error") {
            let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
            return Err(anyhow!(message));
        }
        if json.get("voices").is_none() {
            return Err(anyhow!("Invalid response format"));
        }
        serde_json::from_value(json).context("invalid voice entry")
    }
}

#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Synthesize every segment of `request`. Dropping the future cancels the call.
    async fn synthesize(&self, request: &SynthesisRequest) -> anyhow::Result<EngineResponse>;

    async fn list_voices(&self) -> anyhow::Result<VoiceCatalog>;

    /// Confirm the engine can be reached and has what it needs to synthesize.
    async fn check(&self) -> anyhow::Result<()>;
}
