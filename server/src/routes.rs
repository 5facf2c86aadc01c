use std::path::PathBuf;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use conversion_core::{
    CancellationToken, EngineSettings, ProgressState, SynthesisRequest, TaskStatus, VoiceCatalog,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::jobs::JobView;
use crate::metrics::{MetricsResponse, SystemMetrics};
use crate::validation::{apply_settings_update, validate_conversion_request, SettingsUpdate};
use crate::AppState;

#[derive(Deserialize)]
pub struct ConversionRequest {
    text: String,
    voice_id: String,
    output_file: PathBuf,
}

#[derive(Serialize)]
pub struct ConversionAccepted {
    id: String,
}

#[derive(Deserialize)]
pub struct ServiceProgressRequest {
    progress: u64,
    total: u64,
}

#[derive(Serialize)]
pub struct ServiceStopResponse {
    stopped: bool,
    #[serde(flatten)]
    status: TaskStatus,
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_voices(State(state): State<AppState>) -> Result<Json<VoiceCatalog>, ApiError> {
    let catalog = state
        .engine
        .list_voices()
        .await
        .map_err(|e| ApiError::Engine(e.context("VOICE_ERROR")))?;
    Ok(Json(catalog))
}

#[derive(Serialize)]
pub struct EngineStatus {
    status: &'static str,
}

/// Readiness of the synthesis engine; 502 with `ENGINE_ERROR` when unusable.
pub async fn check_engine(State(state): State<AppState>) -> Result<Json<EngineStatus>, ApiError> {
    state
        .engine
        .check()
        .await
        .map_err(|e| ApiError::Engine(e.context("ENGINE_ERROR")))?;
    Ok(Json(EngineStatus { status: "ok" }))
}

fn current_settings(state: &AppState) -> Result<EngineSettings, ApiError> {
    state
        .settings
        .read()
        .map(|settings| settings.clone())
        .map_err(|_| ApiError::InternalError("settings lock poisoned".to_string()))
}

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<EngineSettings>, ApiError> {
    current_settings(&state).map(Json)
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<EngineSettings>, ApiError> {
    let mut settings = state
        .settings
        .write()
        .map_err(|_| ApiError::InternalError("settings lock poisoned".to_string()))?;
    *settings = apply_settings_update(&settings, update)?;
    info!(
        max_parallel_chapters = settings.max_parallel_chapters,
        rate = %settings.voice_settings.rate,
        volume = %settings.voice_settings.volume,
        pitch = %settings.voice_settings.pitch,
        "Settings updated"
    );
    Ok(Json(settings.clone()))
}

pub async fn start_conversion(
    State(state): State<AppState>,
    Json(req): Json<ConversionRequest>,
) -> Result<(StatusCode, Json<ConversionAccepted>), ApiError> {
    state.metrics.record_request();
    validate_conversion_request(&req.text, &req.voice_id, &req.output_file)?;

    let settings = current_settings(&state)?;
    let (id, cancel) = state.jobs.begin()?;
    state.metrics.record_started();
    info!(
        id = %id,
        voice = %req.voice_id,
        output = %req.output_file.display(),
        text_len = req.text.len(),
        timeout_secs = state.orchestrator.config().synthesis_timeout.as_secs(),
        "Conversion accepted"
    );

    let request = SynthesisRequest {
        text: req.text,
        voice_id: req.voice_id,
        output_path: req.output_file,
        settings,
    };
    tokio::spawn(run_conversion(state, id.clone(), request, cancel));

    Ok((StatusCode::ACCEPTED, Json(ConversionAccepted { id })))
}

/// Drive one run to its outcome, independently of the request that started it.
async fn run_conversion(
    state: AppState,
    id: String,
    request: SynthesisRequest,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let handle = state.service.start();

    let sink = {
        let handle = handle.clone();
        let jobs = state.jobs.clone();
        let id = id.clone();
        move |progress: ProgressState| {
            handle.renew_progress(progress);
            jobs.record_progress(&id, progress);
        }
    };

    let report = state.orchestrator.run(request, &cancel, &sink).await;
    if !handle.is_held() {
        warn!(id = %id, state = ?handle.state(), "Keep-alive ended before the conversion did");
    }

    state.metrics.record_finished(&report, started.elapsed());
    state.service.stop();
    state.jobs.finish(&id, report);
}

pub async fn get_conversion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state
        .jobs
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Conversion not found: {}", id)))
}

pub async fn cancel_conversion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state.jobs.cancel(&id).map(Json)
}

pub async fn service_status(State(state): State<AppState>) -> Json<TaskStatus> {
    Json(state.service.status())
}

pub async fn service_start(State(state): State<AppState>) -> Json<TaskStatus> {
    state.service.start();
    Json(state.service.status())
}

pub async fn service_stop(State(state): State<AppState>) -> Json<ServiceStopResponse> {
    let stopped = state.service.stop();
    Json(ServiceStopResponse {
        stopped,
        status: state.service.status(),
    })
}

pub async fn service_progress(
    State(state): State<AppState>,
    Json(req): Json<ServiceProgressRequest>,
) -> Json<TaskStatus> {
    state.service.update_progress(req.progress, req.total);
    Json(state.service.status())
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        timestamp: Utc::now(),
        system: SystemMetrics::collect(state.started_at.elapsed()),
        conversions: state.metrics.snapshot(),
    })
}
