//! [`SynthesisEngine`] backed by an external command speaking JSON on stdio.
//!
//! The command is invoked as `<program> <args...> <subcommand>`, where the
//! subcommand is `synthesize`, `voices` or `check`. For `synthesize` the request is
//! written to stdin as one JSON document; in both cases the answer is read
//! from stdout. The child is killed if the call is dropped (timeout or
//! cancellation).

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::engine::{EngineResponse, SynthesisEngine, SynthesisRequest, VoiceCatalog};

#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    async fn call(&self, subcommand: &str, stdin_payload: Option<Vec<u8>>) -> anyhow::Result<String> {
        debug!(
            program = %self.program.display(),
            subcommand,
            "Invoking synthesis engine"
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(subcommand)
            .stdin(if stdin_payload.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn engine {}", self.program.display()))?;

        if let Some(payload) = stdin_payload {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("engine stdin unavailable"))?;
            stdin
                .write_all(&payload)
                .await
                .context("failed to send request to engine")?;
            // Closing stdin marks the end of the request.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for engine")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "engine exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        String::from_utf8(output.stdout).context("engine output is not UTF-8")
    }
}

#[async_trait]
impl SynthesisEngine for ProcessEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> anyhow::Result<EngineResponse> {
        info!(
            voice = %request.voice_id,
            output = %request.output_path.display(),
            chars = request.text.len(),
            "Starting synthesis"
        );
        let payload = serde_json::to_vec(request).context("failed to encode request")?;
        let raw = self.call("synthesize", Some(payload)).await?;
        EngineResponse::from_json(&raw)
    }

    async fn list_voices(&self) -> anyhow::Result<VoiceCatalog> {
        let raw = self.call("voices", None).await?;
        VoiceCatalog::from_json(&raw)
    }

    async fn check(&self) -> anyhow::Result<()> {
        let raw = self.call("check", None).await?;
        readiness_from_json(&raw)
    }
}

/// `{ "error": "..." }` or `"success": false` means the engine is not usable.
fn readiness_from_json(raw: &str) -> anyhow::Result<()> {
    let json: serde_json::Value =
        serde_json::from_str(raw).context("engine check output is not valid JSON")?;
    if let Some(error) = json.get("error") {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return Err(anyhow!(message));
    }
    if json.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
        return Err(anyhow!("engine reported it is not ready"));
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> ProcessEngine {
        // `sh -c <script> engine <subcommand>`: the subcommand lands in $1.
        ProcessEngine::new("sh", vec!["-c".into(), script.into(), "engine".into()])
    }

    #[tokio::test]
    async fn test_synthesize_reads_stdout() {
        let engine = shell(
            r#"cat > /dev/null; echo '{"success": true, "total_segments": 1, "results": [{"output_file": "/tmp/x.mp3", "progress": 1}]}'"#,
        );
        let request = SynthesisRequest {
            text: "Bonjour.".into(),
            voice_id: "fr-FR-HenriNeural".into(),
            output_path: "/tmp/out.mp3".into(),
            settings: Default::default(),
        };
        match engine.synthesize(&request).await.unwrap() {
            EngineResponse::Completed { results, total_segments } => {
                assert_eq!(total_segments, 1);
                assert_eq!(results.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subcommand_is_passed_last() {
        let engine = shell(r#"test "$1" = voices && echo '{"voices": []}'"#);
        let catalog = engine.list_voices().await.unwrap();
        assert!(catalog.voices.is_empty());
    }

    #[tokio::test]
    async fn test_check_passes_when_engine_is_ready() {
        let engine = shell(r#"test "$1" = check && echo '{"success": true}'"#);
        engine.check().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_surfaces_engine_error() {
        let engine = shell(r#"echo '{"error": "No module named edge_tts"}'"#);
        let err = engine.check().await.unwrap_err();
        assert!(err.to_string().contains("edge_tts"));

        let engine = shell(r#"echo '{"success": false}'"#);
        assert!(engine.check().await.is_err());
    }

    #[test]
    fn test_readiness_rejects_garbage() {
        assert!(readiness_from_json("python3: not found").is_err());
        assert!(readiness_from_json("{}").is_ok());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let engine = shell("echo broken >&2; exit 3");
        let err = engine.list_voices().await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
