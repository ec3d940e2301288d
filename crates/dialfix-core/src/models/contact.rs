//! Contact models shared by the local cache and the remote gateway

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display name used when the remote contact carries none
pub const UNKNOWN_CONTACT_NAME: &str = "Unknown";

/// State of a contact as returned by the remote directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteContact {
    /// Stable remote identity
    pub resource_id: String,
    /// Opaque token, changes on every remote mutation
    pub version_token: String,
    pub display_name: Option<String>,
    /// First phone number on the contact
    pub phone_number: Option<String>,
    /// Full remote representation
    pub raw: Value,
}

/// Cached mirror of a remote contact, scoped to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalContactRecord {
    pub resource_id: String,
    pub user: String,
    /// May be stale relative to the remote directory
    pub version_token: String,
    pub display_name: String,
    pub phone_number: Option<String>,
    pub raw_snapshot: Value,
}

impl LocalContactRecord {
    /// Mirror a remote contact into a cache record for `user`
    pub fn from_remote(user: &str, remote: &RemoteContact) -> Self {
        Self {
            resource_id: remote.resource_id.clone(),
            user: user.to_string(),
            version_token: remote.version_token.clone(),
            display_name: remote
                .display_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_CONTACT_NAME.to_string()),
            phone_number: remote.phone_number.clone(),
            raw_snapshot: remote.raw.clone(),
        }
    }
}

/// Field-level update applied by a conditional write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdate {
    pub phone: Option<String>,
    pub name: Option<String>,
}

impl ContactUpdate {
    /// True when the update would not change any field
    pub const fn is_empty(&self) -> bool {
        self.phone.is_none() && self.name.is_none()
    }

    /// Remote field mask naming the fields this update touches
    pub fn field_mask(&self) -> Vec<&'static str> {
        let mut fields = Vec::with_capacity(2);
        if self.phone.is_some() {
            fields.push("phoneNumbers");
        }
        if self.name.is_some() {
            fields.push("names");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn from_remote_defaults_missing_name() {
        let remote = RemoteContact {
            resource_id: "people/c9".to_string(),
            version_token: "etag-1".to_string(),
            display_name: None,
            phone_number: Some("+442071838750".to_string()),
            raw: json!({"resourceName": "people/c9"}),
        };

        let record = LocalContactRecord::from_remote("ada@example.com", &remote);
        assert_eq!(record.display_name, UNKNOWN_CONTACT_NAME);
        assert_eq!(record.user, "ada@example.com");
        assert_eq!(record.version_token, "etag-1");
        assert_eq!(record.raw_snapshot, remote.raw);
    }

    #[test]
    fn field_mask_lists_present_fields() {
        let update = ContactUpdate {
            phone: Some("+14155550100".to_string()),
            name: Some("Grace".to_string()),
        };
        assert_eq!(update.field_mask(), vec!["phoneNumbers", "names"]);
        assert!(ContactUpdate::default().is_empty());
        assert!(ContactUpdate::default().field_mask().is_empty());
    }
}
