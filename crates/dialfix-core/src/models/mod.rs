//! Data models for Dialfix

mod contact;
mod staged_change;

pub use contact::{ContactUpdate, LocalContactRecord, RemoteContact, UNKNOWN_CONTACT_NAME};
pub use staged_change::{ChangeAction, NewStagedChange, StagedChange, StagedSummary};
