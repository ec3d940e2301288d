//! Streaming push: the batch algorithm as a live event sequence.
//!
//! A worker task runs the batch and hands events to the consumer over a
//! channel with room for a single event. When the consumer goes away the
//! worker drops the item it is working on, unstages only the items that
//! already have an outcome, and stops.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::engine::PushEngine;
use super::outcome::{PushOutcome, PushResult, PushSummary};
use super::pacer::Throttle;
use crate::error::Result;
use crate::util::user_fingerprint;

/// One step of a streaming push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Emitted once, before any remote call
    Start { total: usize, skipped: usize },
    /// Emitted before the throttle wait of item `current` (1-based)
    Progress {
        current: usize,
        total: usize,
        name: String,
    },
    /// The current item hit a rate limit and is waiting before retrying
    Backoff {
        name: String,
        wait_seconds: u64,
        attempt: u32,
    },
    /// Emitted once, last, after the staged set was cleared
    Complete(PushSummary),
    /// The batch could not run or could not be cleared; always last
    Error { message: String },
}

impl PushEvent {
    /// Name of the event, matching the serialized `type` tag
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Progress { .. } => "progress",
            Self::Backoff { .. } => "backoff",
            Self::Complete(_) => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// Whether no further event follows this one
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

/// Receiving end of a streaming push
#[derive(Debug)]
pub struct PushStream {
    events: mpsc::Receiver<PushEvent>,
    worker: JoinHandle<()>,
}

impl PushStream {
    /// Next event, `None` once the worker is done
    pub async fn next(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }

    /// Split into the event receiver and the worker handle.
    ///
    /// Dropping the receiver cancels the run.
    pub fn into_parts(self) -> (mpsc::Receiver<PushEvent>, JoinHandle<()>) {
        (self.events, self.worker)
    }
}

enum StreamEnd {
    Completed(PushSummary),
    Disconnected,
}

impl PushEngine {
    /// Start a streaming push for `user` on the tokio runtime.
    pub fn push_stream(&self, user: &str) -> PushStream {
        let (tx, events) = mpsc::channel(1);
        let engine = self.clone();
        let user = user.to_string();
        let worker = tokio::spawn(async move { engine.run_stream(&user, tx).await });

        PushStream { events, worker }
    }

    async fn run_stream(&self, user: &str, tx: mpsc::Sender<PushEvent>) {
        match self.stream_batch(user, &tx).await {
            Ok(StreamEnd::Completed(summary)) => {
                let _ = tx.send(PushEvent::Complete(summary)).await;
            }
            Ok(StreamEnd::Disconnected) => {
                tracing::info!(user = user_fingerprint(user), "Push stream disconnected");
            }
            Err(error) => {
                tracing::error!(user = user_fingerprint(user), "Push stream failed: {}", error);
                let _ = tx
                    .send(PushEvent::Error {
                        message: error.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn stream_batch(&self, user: &str, tx: &mpsc::Sender<PushEvent>) -> Result<StreamEnd> {
        let changes = self.staged().list_for_user(user).await?;
        let (pushable, rejected): (Vec<_>, Vec<_>) = changes
            .into_iter()
            .partition(|change| change.action.is_pushable());

        let start = PushEvent::Start {
            total: pushable.len(),
            skipped: rejected.len(),
        };
        if tx.send(start).await.is_err() {
            return Ok(StreamEnd::Disconnected);
        }
        if pushable.is_empty() && rejected.is_empty() {
            return Ok(StreamEnd::Completed(PushSummary::empty()));
        }

        let mut result = PushResult::default();
        let mut processed = Vec::with_capacity(pushable.len() + rejected.len());
        for change in rejected {
            result.record(PushOutcome::Skipped(change.contact_name));
            processed.push(change.resource_id);
        }

        let total = pushable.len();
        let mut throttle = Throttle::new(self.config().throttle_delay);
        for (index, change) in pushable.iter().enumerate() {
            let progress = PushEvent::Progress {
                current: index + 1,
                total,
                name: change.contact_name.clone(),
            };
            if tx.send(progress).await.is_err() {
                self.abandon(user, &processed).await;
                return Ok(StreamEnd::Disconnected);
            }

            let work = async {
                throttle.wait(self.sleeper()).await;
                self.push_item(user, change, Some(tx)).await
            };
            let outcome = tokio::select! {
                outcome = work => outcome,
                () = tx.closed() => {
                    self.abandon(user, &processed).await;
                    return Ok(StreamEnd::Disconnected);
                }
            };

            result.record(outcome);
            processed.push(change.resource_id.clone());
        }

        self.finish(user, result).await.map(StreamEnd::Completed)
    }

    /// Unstage the items that already have an outcome; leave the rest staged
    async fn abandon(&self, user: &str, processed: &[String]) {
        for resource_id in processed {
            if let Err(error) = self.staged().remove(user, resource_id).await {
                tracing::warn!(
                    resource_id = %resource_id,
                    "Failed to unstage processed change: {}",
                    error
                );
            }
        }
        tracing::info!(
            user = user_fingerprint(user),
            processed = processed.len(),
            "Abandoned push after disconnect"
        );
    }
}
