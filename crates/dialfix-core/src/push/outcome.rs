//! Per-item outcomes and the aggregate result of one push run.

use serde::{Deserialize, Serialize};

/// Terminal outcome of one staged change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Written to the remote directory
    Pushed(String),
    /// Abandoned, with a short reason
    Failed(String, String),
    /// Rejected by the user, never sent
    Skipped(String),
}

/// A failed item as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPush {
    pub name: String,
    pub error: String,
}

/// Itemized outcomes of one run, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    #[serde(rename = "success")]
    pub pushed: Vec<String>,
    pub failed: Vec<FailedPush>,
    pub skipped: Vec<String>,
}

impl PushResult {
    pub fn record(&mut self, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Pushed(name) => self.pushed.push(name),
            PushOutcome::Failed(name, error) => self.failed.push(FailedPush { name, error }),
            PushOutcome::Skipped(name) => self.skipped.push(name),
        }
    }

    /// Number of items with a recorded outcome
    pub fn total(&self) -> usize {
        self.pushed.len() + self.failed.len() + self.skipped.len()
    }
}

/// Aggregate counts plus itemized details, returned once a run completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSummary {
    pub status: String,
    pub pushed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub details: PushResult,
}

impl PushSummary {
    pub fn completed(details: PushResult) -> Self {
        Self {
            status: "completed".to_string(),
            pushed: details.pushed.len(),
            failed: details.failed.len(),
            skipped: details.skipped.len(),
            message: None,
            details,
        }
    }

    /// Summary for a user with nothing staged
    pub fn empty() -> Self {
        Self {
            message: Some("No staged changes to push".to_string()),
            ..Self::completed(PushResult::default())
        }
    }
}
