pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod validation;

use std::sync::{Arc, RwLock};
use std::time::Instant;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use conversion_core::{EngineSettings, Orchestrator, SynthesisEngine, TaskHost};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::ServerConfig;
use crate::jobs::JobRegistry;
use crate::metrics::ConversionMetrics;
use crate::validation::MAX_TEXT_LENGTH;

/// Label of the keep-alive guarantee held while a conversion runs.
pub const SERVICE_LABEL: &str = "tts-conversion";

/// Largest accepted request body. JSON escaping can grow each text byte up to
/// six (`\u001f`), so a text at the length limit still fits; the length
/// itself is enforced by validation.
pub const MAX_BODY_BYTES: usize = MAX_TEXT_LENGTH * 6 + 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn SynthesisEngine>,
    pub orchestrator: Arc<Orchestrator>,
    pub service: Arc<TaskHost>,
    pub settings: Arc<RwLock<EngineSettings>>,
    pub jobs: Arc<JobRegistry>,
    pub metrics: Arc<ConversionMetrics>,
    pub config: ServerConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<dyn SynthesisEngine>, config: ServerConfig) -> Self {
        let orchestrator = Orchestrator::new(engine.clone(), config.orchestrator_config());
        Self {
            engine,
            orchestrator: Arc::new(orchestrator),
            service: Arc::new(TaskHost::new(SERVICE_LABEL, config.keep_alive_max())),
            settings: Arc::new(RwLock::new(EngineSettings::default())),
            jobs: Arc::new(JobRegistry::new()),
            metrics: Arc::new(ConversionMetrics::new()),
            config,
            started_at: Instant::now(),
        }
    }
}

/// All routes, mounted at the root and again under `/api`.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/healthz", get(routes::health_check))
        .route("/voices", get(routes::list_voices))
        .route("/engine", get(routes::check_engine))
        .route(
            "/settings",
            get(routes::get_settings).put(routes::update_settings),
        )
        .route("/conversions", post(routes::start_conversion))
        .route("/conversions/{id}", get(routes::get_conversion))
        .route("/conversions/{id}/cancel", post(routes::cancel_conversion))
        .route("/service", get(routes::service_status))
        .route("/service/start", post(routes::service_start))
        .route("/service/stop", post(routes::service_stop))
        .route("/service/progress", post(routes::service_progress))
        .route("/metrics", get(routes::metrics_endpoint));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(middleware::add_request_id))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
