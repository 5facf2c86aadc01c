use serde::Serialize;

/// Segments completed out of the run's declared total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub completed: u64,
    pub total: u64,
}

impl ProgressState {
    pub fn new(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }

    /// Integer percentage in `0..=100`; 0 when `total` is 0.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        (self.completed.saturating_mul(100) / self.total).min(100) as u8
    }
}

/// Receiver of progress updates. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, state: ProgressState);
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn publish(&self, _state: ProgressState) {}
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressState) + Send + Sync,
{
    fn publish(&self, state: ProgressState) {
        self(state)
    }
}
