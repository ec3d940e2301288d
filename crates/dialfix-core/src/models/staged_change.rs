//! Staged change model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::models::ContactUpdate;
use crate::util::normalize_text_option;

/// User decision about a proposed phone number fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Apply the proposed phone number as-is
    Accept,
    /// Leave the remote contact untouched
    Reject,
    /// Apply a user-edited phone number and/or name
    Edit,
}

impl ChangeAction {
    /// Storage representation of this action
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Edit => "edit",
        }
    }

    /// Whether a push must write this decision to the remote directory
    pub const fn is_pushable(self) -> bool {
        !matches!(self, Self::Reject)
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            "edit" => Ok(Self::Edit),
            other => Err(Error::InvalidInput(format!("Unknown change action: {other}"))),
        }
    }
}

/// A pending user decision about one remote contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedChange {
    /// Remote identity of the contact
    pub resource_id: String,
    /// Display name at the time the change was staged
    pub contact_name: String,
    /// Phone number as currently stored remotely
    pub original_phone: String,
    /// Phone number to write
    pub proposed_phone: String,
    /// Decision taken by the user
    pub action: ChangeAction,
    /// Replacement name, only kept for `edit`
    pub proposed_name: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl StagedChange {
    /// Field-level update this change asks the remote directory to apply.
    ///
    /// Blank values are treated as absent.
    pub fn contact_update(&self) -> ContactUpdate {
        ContactUpdate {
            phone: normalize_text_option(Some(self.proposed_phone.clone())),
            name: normalize_text_option(self.proposed_name.clone()),
        }
    }
}

/// Input for staging a decision; timestamps are assigned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStagedChange {
    pub resource_id: String,
    pub contact_name: String,
    pub original_phone: String,
    pub proposed_phone: String,
    pub action: ChangeAction,
    #[serde(default)]
    pub proposed_name: Option<String>,
}

impl NewStagedChange {
    /// Validate and normalize before storage.
    ///
    /// A proposed name only survives for `edit` decisions.
    pub fn normalized(self) -> crate::Result<Self> {
        let resource_id = self.resource_id.trim().to_string();
        if resource_id.is_empty() {
            return Err(Error::InvalidInput(
                "resource_id must not be empty".to_string(),
            ));
        }

        let proposed_name = if self.action == ChangeAction::Edit {
            normalize_text_option(self.proposed_name)
        } else {
            None
        };

        Ok(Self {
            resource_id,
            contact_name: self.contact_name.trim().to_string(),
            original_phone: self.original_phone.trim().to_string(),
            proposed_phone: self.proposed_phone.trim().to_string(),
            action: self.action,
            proposed_name,
        })
    }
}

/// Per-action counts of a user's staged set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedSummary {
    pub total: usize,
    pub accepts: usize,
    pub rejects: usize,
    pub edits: usize,
}

impl StagedSummary {
    /// Count one staged change
    pub fn add(&mut self, action: ChangeAction, count: usize) {
        self.total += count;
        match action {
            ChangeAction::Accept => self.accepts += count,
            ChangeAction::Reject => self.rejects += count,
            ChangeAction::Edit => self.edits += count,
        }
    }
}
