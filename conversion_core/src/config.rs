// Tunables for a conversion run

use std::sync::Arc;
use std::time::Duration;

use crate::header::{FixedHeaderSkip, HeaderSkipPolicy};

/// Upper bound on the wait for the engine's result batch.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Upper bound on a keep-alive guarantee.
pub const DEFAULT_KEEP_ALIVE_MAX: Duration = Duration::from_secs(3 * 60 * 60);
pub const DEFAULT_CHAPTER_EXTENSION: &str = "mp3";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub synthesis_timeout: Duration,
    pub header_policy: Arc<dyn HeaderSkipPolicy>,
    /// Extension of the per-chapter intermediates.
    pub chapter_extension: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            header_policy: Arc::new(FixedHeaderSkip::default()),
            chapter_extension: DEFAULT_CHAPTER_EXTENSION.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = timeout;
        self
    }

    pub fn with_header_policy(mut self, policy: Arc<dyn HeaderSkipPolicy>) -> Self {
        self.header_policy = policy;
        self
    }

    pub fn with_chapter_extension(mut self, extension: impl Into<String>) -> Self {
        self.chapter_extension = extension.into();
        self
    }
}
