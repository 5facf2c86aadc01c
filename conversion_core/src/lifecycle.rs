//! Keep-alive guarantee and progress publication for background conversions.
//!
//! A [`BackgroundTaskHandle`] stands for "this process must keep working even
//! with nobody watching". It is bounded: once `max_duration` elapses the
//! guarantee is aborted on its own, whatever the run is doing. Progress goes
//! out through a `watch` channel so publishers never wait on observers.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::progress::{ProgressSink, ProgressState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepAliveState {
    Held,
    Released,
    /// The bound elapsed before anyone released the guarantee.
    Expired,
}

/// What observers of a background task see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub total: u64,
    pub percent: u8,
}

impl From<ProgressState> for ProgressSnapshot {
    fn from(state: ProgressState) -> Self {
        Self {
            completed: state.completed,
            total: state.total,
            percent: state.percent(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    label: String,
    acquired_at: Instant,
    max_duration: Duration,
    state: Mutex<KeepAliveState>,
    expiry: Mutex<Option<JoinHandle<()>>>,
    progress: watch::Sender<ProgressSnapshot>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    fn expire(&self) {
        let mut state = lock(&self.state);
        if *state == KeepAliveState::Held {
            *state = KeepAliveState::Expired;
            error!(
                label = %self.label,
                max_secs = self.max_duration.as_secs(),
                "Keep-alive bound exceeded, guarantee aborted"
            );
        }
    }

    fn release(&self) -> bool {
        let mut state = lock(&self.state);
        if *state != KeepAliveState::Held {
            debug!(label = %self.label, state = ?*state, "Keep-alive already released");
            return false;
        }
        *state = KeepAliveState::Released;
        if let Some(timer) = lock(&self.expiry).take() {
            timer.abort();
        }
        info!(
            label = %self.label,
            held_secs = self.acquired_at.elapsed().as_secs(),
            "Keep-alive released"
        );
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.release();
    }
}

/// Handle on a bounded keep-alive guarantee. Clones share the same guarantee;
/// it is released when [`release`](Self::release) is called or the last clone
/// is dropped.
#[derive(Debug, Clone)]
pub struct BackgroundTaskHandle {
    inner: Arc<Inner>,
}

impl BackgroundTaskHandle {
    /// Acquire a guarantee that expires after `max_duration`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn acquire(label: impl Into<String>, max_duration: Duration) -> Self {
        let (progress, _) = watch::channel(ProgressSnapshot::default());
        let inner = Arc::new(Inner {
            label: label.into(),
            acquired_at: Instant::now(),
            max_duration,
            state: Mutex::new(KeepAliveState::Held),
            expiry: Mutex::new(None),
            progress,
        });
        info!(
            label = %inner.label,
            max_secs = max_duration.as_secs(),
            "Keep-alive acquired"
        );

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(max_duration).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire();
            }
        });
        *lock(&inner.expiry) = Some(timer);

        Self { inner }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn state(&self) -> KeepAliveState {
        *lock(&self.inner.state)
    }

    pub fn is_held(&self) -> bool {
        self.state() == KeepAliveState::Held
    }

    pub fn held_for(&self) -> Duration {
        self.inner.acquired_at.elapsed()
    }

    /// Publish new progress. Never blocks; republishing the same value is fine.
    pub fn renew_progress(&self, state: ProgressState) {
        let snapshot = ProgressSnapshot::from(state);
        debug!(
            label = %self.inner.label,
            completed = snapshot.completed,
            total = snapshot.total,
            percent = snapshot.percent,
            "Progress update"
        );
        self.inner.progress.send_replace(snapshot);
    }

    pub fn progress(&self) -> ProgressSnapshot {
        *self.inner.progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.inner.progress.subscribe()
    }

    /// Release the guarantee. Returns `false` if it was already released or
    /// had expired.
    pub fn release(&self) -> bool {
        self.inner.release()
    }
}

impl ProgressSink for BackgroundTaskHandle {
    fn publish(&self, state: ProgressState) {
        self.renew_progress(state);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub label: String,
    /// `None` when no guarantee was ever acquired or the last one was stopped.
    pub state: Option<KeepAliveState>,
    pub progress: ProgressSnapshot,
    pub held_for_secs: u64,
}

/// Single-slot host for the conversion service: at most one guarantee at a time.
#[derive(Debug)]
pub struct TaskHost {
    label: String,
    max_duration: Duration,
    current: Mutex<Option<BackgroundTaskHandle>>,
}

impl TaskHost {
    pub fn new(label: impl Into<String>, max_duration: Duration) -> Self {
        Self {
            label: label.into(),
            max_duration,
            current: Mutex::new(None),
        }
    }

    /// Return the held guarantee, acquiring a fresh one if needed.
    pub fn start(&self) -> BackgroundTaskHandle {
        let mut current = lock(&self.current);
        if let Some(handle) = current.as_ref().filter(|h| h.is_held()) {
            debug!(label = %self.label, "Background task already running");
            return handle.clone();
        }
        let handle = BackgroundTaskHandle::acquire(self.label.clone(), self.max_duration);
        *current = Some(handle.clone());
        handle
    }

    /// Forward progress, starting the task first if it is not running.
    pub fn update_progress(&self, completed: u64, total: u64) {
        self.start()
            .renew_progress(ProgressState::new(completed, total));
    }

    /// Release and forget the current guarantee. Safe to call repeatedly.
    pub fn stop(&self) -> bool {
        match lock(&self.current).take() {
            Some(handle) => handle.release(),
            None => {
                debug!(label = %self.label, "No background task to stop");
                false
            }
        }
    }

    pub fn status(&self) -> TaskStatus {
        let current = lock(&self.current);
        match current.as_ref() {
            Some(handle) => TaskStatus {
                label: handle.label().to_string(),
                state: Some(handle.state()),
                progress: handle.progress(),
                held_for_secs: handle.held_for().as_secs(),
            },
            None => TaskStatus {
                label: self.label.clone(),
                state: None,
                progress: ProgressSnapshot::default(),
                held_for_secs: 0,
            },
        }
    }
}
