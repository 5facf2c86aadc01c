// Configuration constants for the server

use std::sync::Arc;
use std::time::Duration;

use conversion_core::config::{
    DEFAULT_CHAPTER_EXTENSION, DEFAULT_KEEP_ALIVE_MAX, DEFAULT_SYNTHESIS_TIMEOUT,
};
use conversion_core::header::DEFAULT_HEADER_SKIP;
use conversion_core::{FixedHeaderSkip, OrchestratorConfig, ProcessEngine};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub synthesis_timeout_secs: u64,
    pub keep_alive_max_secs: u64,
    pub header_skip_bytes: u64,
    pub chapter_extension: String,
    pub engine_command: String,
    pub engine_args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            synthesis_timeout_secs: DEFAULT_SYNTHESIS_TIMEOUT.as_secs(),
            keep_alive_max_secs: DEFAULT_KEEP_ALIVE_MAX.as_secs(),
            header_skip_bytes: DEFAULT_HEADER_SKIP,
            chapter_extension: DEFAULT_CHAPTER_EXTENSION.to_string(),
            engine_command: "python3".to_string(),
            engine_args: vec!["edge_tts_bridge.py".to_string()],
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect()
            });

        let chapter_extension = std::env::var("CHAPTER_EXTENSION")
            .ok()
            .map(|ext| ext.trim().trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .unwrap_or(defaults.chapter_extension);

        let engine_command = std::env::var("ENGINE_COMMAND")
            .ok()
            .filter(|cmd| !cmd.trim().is_empty())
            .unwrap_or(defaults.engine_command);

        let engine_args = std::env::var("ENGINE_ARGS")
            .ok()
            .map(|args| args.split_whitespace().map(str::to_string).collect())
            .unwrap_or(defaults.engine_args);

        Self {
            port: env_or("PORT", defaults.port),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            cors_allowed_origins,
            synthesis_timeout_secs: env_or("SYNTHESIS_TIMEOUT_SECS", defaults.synthesis_timeout_secs),
            keep_alive_max_secs: env_or("KEEP_ALIVE_MAX_SECS", defaults.keep_alive_max_secs),
            header_skip_bytes: env_or("HEADER_SKIP_BYTES", defaults.header_skip_bytes),
            chapter_extension,
            engine_command,
            engine_args,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    pub fn keep_alive_max(&self) -> Duration {
        Duration::from_secs(self.keep_alive_max_secs)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_timeout(self.synthesis_timeout())
            .with_header_policy(Arc::new(FixedHeaderSkip(self.header_skip_bytes)))
            .with_chapter_extension(self.chapter_extension.clone())
    }

    pub fn process_engine(&self) -> ProcessEngine {
        ProcessEngine::new(&self.engine_command, self.engine_args.clone())
    }
}
