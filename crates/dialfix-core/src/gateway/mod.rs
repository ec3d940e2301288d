//! Remote contact directory boundary.
//!
//! The push engine and contact sync only see the [`ContactGateway`] trait.
//! Failures are tagged so callers can tell a rate-limit signal apart from
//! permanent failures with a plain match.

mod people;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ContactUpdate, RemoteContact};

pub use people::PeopleApiClient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Remote contact not found: {0}")]
    NotFound(String),
    #[error("Rate limited by remote directory: {0}")]
    RateLimited(String),
    #[error("Remote contact changed since it was read: {0}")]
    VersionConflict(String),
    #[error("Remote request failed: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Whether the remote asked us to slow down and try again later
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// One page of the remote contact listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactPage {
    pub contacts: Vec<RemoteContact>,
    pub next_page_token: Option<String>,
}

/// Authenticated access to a versioned remote contact directory
#[async_trait]
pub trait ContactGateway: Send + Sync {
    /// Read the current state, including a fresh version token
    async fn fetch(&self, resource_id: &str) -> GatewayResult<RemoteContact>;

    /// Apply `update` only if the remote still carries `version_token`
    async fn conditional_update(
        &self,
        resource_id: &str,
        version_token: &str,
        update: &ContactUpdate,
    ) -> GatewayResult<RemoteContact>;

    /// List the user's contacts, one page at a time
    async fn list_contacts(&self, page_token: Option<&str>) -> GatewayResult<ContactPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limited_is_retryable() {
        assert!(GatewayError::RateLimited("quota".into()).is_rate_limited());
        assert!(!GatewayError::NotFound("people/c1".into()).is_rate_limited());
        assert!(!GatewayError::VersionConflict("etag".into()).is_rate_limited());
        assert!(!GatewayError::Transport("reset".into()).is_rate_limited());
    }
}
