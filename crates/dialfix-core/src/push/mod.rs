//! Push pipeline: replays a user's staged decisions against the remote
//! directory under a fixed inter-item throttle and exponential backoff on
//! rate limiting.
//!
//! Two entry points share one per-item algorithm:
//! - [`PushEngine::push`] runs the whole batch and returns a [`PushSummary`]
//! - [`PushEngine::push_stream`] runs it on a worker task and yields
//!   [`PushEvent`]s as items progress

mod config;
mod engine;
mod outcome;
mod pacer;
mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use config::PushConfig;
pub use engine::{PushEngine, MISSING_LOCAL_CONTACT};
pub use outcome::{FailedPush, PushOutcome, PushResult, PushSummary};
pub use pacer::{Sleeper, Throttle, TokioSleeper, WaitReason};
pub use stream::{PushEvent, PushStream};
