//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use conversion_core::{
    EngineResponse, SegmentResult, SynthesisEngine, SynthesisRequest, Voice, VoiceCatalog,
};
use server::config::ServerConfig;
use server::{app, AppState};
use tower::ServiceExt;

/// Engine double that writes real fragment files next to the requested output.
pub enum FakeEngine {
    /// Writes `chapters` chapters of `segments` fragments, 400 bytes each.
    Writes { chapters: u32, segments: u32 },
    /// Never answers.
    Hang,
    /// Every call fails.
    Broken,
}

#[async_trait]
impl SynthesisEngine for FakeEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> anyhow::Result<EngineResponse> {
        match self {
            FakeEngine::Writes { chapters, segments } => {
                let dir = request
                    .output_path
                    .parent()
                    .ok_or_else(|| anyhow::anyhow!("output has no parent"))?;
                let total = u64::from(chapters * segments);
                let mut results = Vec::new();
                let mut done = 0;
                for segment in 0..*segments {
                    for chapter in 0..*chapters {
                        let path = dir.join(format!("frag_{chapter}_{segment}.mp3"));
                        std::fs::write(&path, vec![chapter as u8; 400])?;
                        done += 1;
                        results.push(SegmentResult::new(path, chapter, done));
                    }
                }
                Ok(EngineResponse::Completed {
                    results,
                    total_segments: total,
                })
            }
            FakeEngine::Hang => std::future::pending().await,
            FakeEngine::Broken => Err(anyhow::anyhow!("engine process exited with status 1")),
        }
    }

    async fn list_voices(&self) -> anyhow::Result<VoiceCatalog> {
        match self {
            FakeEngine::Broken => Err(anyhow::anyhow!("edge-tts unavailable")),
            _ => Ok(VoiceCatalog {
                voices: vec![Voice {
                    name: "Microsoft Server Speech Text to Speech Voice (fr-FR, HenriNeural)"
                        .to_string(),
                    short_name: "fr-FR-HenriNeural".to_string(),
                    gender: "Male".to_string(),
                    locale: "fr-FR".to_string(),
                }],
            }),
        }
    }

    async fn check(&self) -> anyhow::Result<()> {
        match self {
            FakeEngine::Broken => Err(anyhow::anyhow!("python3: command not found")),
            _ => Ok(()),
        }
    }
}

/// Create a test app instance around `engine`
pub fn create_test_app(engine: FakeEngine) -> Router {
    let config = ServerConfig {
        synthesis_timeout_secs: 5,
        ..ServerConfig::default()
    };
    app(AppState::new(Arc::new(engine), config))
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    json_request("POST", uri, body)
}

pub fn put_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    json_request("PUT", uri, body)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Poll a conversion until it leaves `running`
pub async fn wait_for_conversion(app: &Router, id: &str) -> serde_json::Value {
    for _ in 0..300 {
        let (status, body) = send(app, get(&format!("/conversions/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "running" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("conversion {id} did not finish");
}
