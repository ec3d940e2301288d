//! Batch push: replay one user's staged changes against the remote directory.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::config::PushConfig;
use super::outcome::{PushOutcome, PushResult, PushSummary};
use super::pacer::{Sleeper, Throttle, TokioSleeper, WaitReason};
use super::stream::PushEvent;
use crate::db::{ContactCache, StagedChangeStore};
use crate::error::Result;
use crate::gateway::{ContactGateway, GatewayError};
use crate::models::{ContactUpdate, LocalContactRecord, RemoteContact, StagedChange};
use crate::util::{truncate_chars, user_fingerprint};

/// Reason recorded when a staged change has no cached contact
pub const MISSING_LOCAL_CONTACT: &str = "Contact not found in local DB";

/// Replays staged changes under throttling and rate-limit backoff.
///
/// The engine holds no per-user state; one value can serve any number of
/// users concurrently. At most one run per user at a time is the caller's
/// responsibility.
#[derive(Clone)]
pub struct PushEngine {
    gateway: Arc<dyn ContactGateway>,
    staged: Arc<dyn StagedChangeStore>,
    cache: Arc<dyn ContactCache>,
    sleeper: Arc<dyn Sleeper>,
    config: PushConfig,
}

impl PushEngine {
    pub fn new(
        gateway: Arc<dyn ContactGateway>,
        staged: Arc<dyn StagedChangeStore>,
        cache: Arc<dyn ContactCache>,
    ) -> Self {
        Self {
            gateway,
            staged,
            cache,
            sleeper: Arc::new(TokioSleeper),
            config: PushConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PushConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub const fn config(&self) -> &PushConfig {
        &self.config
    }

    pub(super) fn staged(&self) -> &dyn StagedChangeStore {
        self.staged.as_ref()
    }

    pub(super) fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// Push every staged change for `user` and clear the staged set.
    ///
    /// Per-item failures are reported in the summary. Only failures to list
    /// or clear the staged set are returned as errors.
    pub async fn push(&self, user: &str) -> Result<PushSummary> {
        let user_hash = user_fingerprint(user);
        let changes = self.staged.list_for_user(user).await?;

        if changes.is_empty() {
            tracing::info!(user = user_hash, "No staged changes to push");
            return Ok(PushSummary::empty());
        }

        tracing::info!(user = user_hash, items = changes.len(), "Starting push");

        let mut result = PushResult::default();
        let mut throttle = Throttle::new(self.config.throttle_delay);
        for change in &changes {
            if !change.action.is_pushable() {
                result.record(PushOutcome::Skipped(change.contact_name.clone()));
                continue;
            }

            throttle.wait(self.sleeper.as_ref()).await;
            let outcome = self.push_item(user, change, None).await;
            result.record(outcome);
        }

        self.finish(user, result).await
    }

    /// Clear the staged set and build the summary for a finished run
    pub(super) async fn finish(&self, user: &str, result: PushResult) -> Result<PushSummary> {
        let cleared = self.staged.clear_for_user(user).await?;
        let items = result.total();
        let summary = PushSummary::completed(result);

        tracing::info!(
            user = user_fingerprint(user),
            items,
            pushed = summary.pushed,
            failed = summary.failed,
            skipped = summary.skipped,
            cleared,
            "Push completed"
        );
        Ok(summary)
    }

    /// Push one accepted or edited change.
    ///
    /// Never fails: every error becomes a `Failed` outcome. Backoff notices
    /// are sent to `events` when a stream is listening.
    pub(super) async fn push_item(
        &self,
        user: &str,
        change: &StagedChange,
        events: Option<&mpsc::Sender<PushEvent>>,
    ) -> PushOutcome {
        let name = change.contact_name.clone();

        let cached = match self.cache.find(&change.resource_id, user).await {
            Ok(cached) => cached,
            Err(error) => return self.failed(name, &change.resource_id, &error),
        };
        if cached.is_none() {
            tracing::warn!(
                resource_id = %change.resource_id,
                "Contact not found for push"
            );
            return PushOutcome::Failed(name, MISSING_LOCAL_CONTACT.to_string());
        }

        let update = change.contact_update();
        let mut retry = 0;
        loop {
            match self.write_remote(&change.resource_id, &update).await {
                Ok(updated) => {
                    if let Some(remote) = updated {
                        self.write_back(user, &remote).await;
                    }
                    tracing::info!(resource_id = %change.resource_id, "Pushed contact");
                    return PushOutcome::Pushed(name);
                }
                Err(error) if error.is_rate_limited() && retry < self.config.max_retries => {
                    let wait = self.config.backoff_for_retry(retry);
                    retry += 1;
                    tracing::warn!(
                        resource_id = %change.resource_id,
                        wait_secs = wait.as_secs(),
                        attempt = retry,
                        max_attempts = self.config.max_attempts(),
                        "Rate limited, backing off"
                    );
                    if let Some(events) = events {
                        // A closed stream is noticed by the stream worker
                        let _ = events
                            .send(PushEvent::Backoff {
                                name: name.clone(),
                                wait_seconds: wait.as_secs(),
                                attempt: retry,
                            })
                            .await;
                    }
                    self.sleeper.sleep(wait, WaitReason::Backoff).await;
                }
                Err(error) => return self.failed(name, &change.resource_id, &error),
            }
        }
    }

    /// Fetch a fresh version token, then apply the update conditionally.
    ///
    /// Returns `None` when there is nothing to write.
    async fn write_remote(
        &self,
        resource_id: &str,
        update: &ContactUpdate,
    ) -> std::result::Result<Option<RemoteContact>, GatewayError> {
        let current = self.gateway.fetch(resource_id).await?;
        if update.is_empty() {
            return Ok(None);
        }

        self.gateway
            .conditional_update(resource_id, &current.version_token, update)
            .await
            .map(Some)
    }

    async fn write_back(&self, user: &str, remote: &RemoteContact) {
        let record = LocalContactRecord::from_remote(user, remote);
        if let Err(error) = self.cache.write_through(&record).await {
            // The remote write already happened; the next sync repairs the cache
            tracing::warn!(
                resource_id = %remote.resource_id,
                "Failed to cache pushed contact: {}",
                error
            );
        }
    }

    fn failed(
        &self,
        name: String,
        resource_id: &str,
        error: &impl std::fmt::Display,
    ) -> PushOutcome {
        tracing::error!(resource_id = %resource_id, "Failed to push contact: {}", error);
        let reason = truncate_chars(&error.to_string(), self.config.reason_max_chars);
        PushOutcome::Failed(name, reason)
    }
}
