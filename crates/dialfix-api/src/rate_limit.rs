use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use dialfix_core::util::user_fingerprint;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;

/// Fixed-window request limiter keyed by caller identity
#[derive(Clone)]
pub struct UserRateLimiter {
    state: Arc<Mutex<HashMap<String, RateWindow>>>,
    window: Duration,
    limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Default)]
struct RateLimitMetrics {
    allowed: AtomicU64,
    limited: AtomicU64,
    push_conflicts: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub allowed: u64,
    pub limited: u64,
    pub push_conflicts: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl UserRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.rate_limit_window, config.rate_limit_per_window)
    }

    fn new(window: Duration, limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, user_id: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut guard = self.state.lock().await;

        // Drop windows that ended so idle users do not accumulate
        guard.retain(|_, entry| now.duration_since(entry.started_at) < self.window);

        let entry = guard.entry(user_id.to_string()).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if entry.count >= self.limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs()
                .max(1);
            self.metrics.limited.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                user = user_fingerprint(user_id),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                "Rate limit exceeded, try again later",
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_push_conflict(&self) {
        self.metrics.push_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            allowed: self.metrics.allowed.load(Ordering::Relaxed),
            limited: self.metrics.limited.load(Ordering::Relaxed),
            push_conflicts: self.metrics.push_conflicts.load(Ordering::Relaxed),
        }
    }
}

/// Per-user exclusion between push runs and edits to the staged set.
///
/// A push run is exclusive. Edits may overlap each other but never a push,
/// since the run clears the staged set once it finishes.
#[derive(Clone, Default)]
pub struct PushGuard {
    state: Arc<StdMutex<GuardState>>,
}

#[derive(Debug, Default)]
struct GuardState {
    pushes: HashSet<String>,
    edits: HashMap<String, usize>,
}

/// Held for the duration of one push run; releases the user on drop
#[derive(Debug)]
pub struct PushPermit {
    user_id: String,
    state: Arc<StdMutex<GuardState>>,
}

/// Held while one request edits the staged set
#[derive(Debug)]
pub struct EditPermit {
    user_id: String,
    state: Arc<StdMutex<GuardState>>,
}

impl PushGuard {
    fn lock(&self) -> std::sync::MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_acquire(&self, user_id: &str) -> Result<PushPermit, AppError> {
        let mut state = self.lock();
        if state.pushes.contains(user_id) {
            return Err(AppError::conflict(
                "A push is already running for this user",
            ));
        }
        if state.edits.contains_key(user_id) {
            return Err(AppError::conflict(
                "Staged changes are being modified, try the push again",
            ));
        }
        state.pushes.insert(user_id.to_string());

        Ok(PushPermit {
            user_id: user_id.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    /// Admit one edit of the staged set unless a push is running
    pub fn try_edit(&self, user_id: &str) -> Result<EditPermit, AppError> {
        let mut state = self.lock();
        if state.pushes.contains(user_id) {
            return Err(AppError::conflict(
                "A push is running for this user, staged changes are locked until it finishes",
            ));
        }
        *state.edits.entry(user_id.to_string()).or_insert(0) += 1;

        Ok(EditPermit {
            user_id: user_id.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    pub fn is_running(&self, user_id: &str) -> bool {
        self.lock().pushes.contains(user_id)
    }
}

impl Drop for PushPermit {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pushes
            .remove(&self.user_id);
    }
}

impl Drop for EditPermit {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = state.edits.get_mut(&self.user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.edits.remove(&self.user_id);
            }
        }
    }
}
