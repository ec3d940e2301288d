//! dialfix-core - Core library for Dialfix
//!
//! This crate contains the contact models, the local cache and staged change
//! store, the remote gateway client, and the push engine that replays staged
//! phone number fixes to the remote directory.

pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod push;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{ChangeAction, LocalContactRecord, NewStagedChange, StagedChange};
pub use push::{PushConfig, PushEngine, PushEvent, PushSummary};
