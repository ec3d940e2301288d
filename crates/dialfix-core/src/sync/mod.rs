//! Contact sync: mirror the remote directory into the local cache.

use serde::{Deserialize, Serialize};

use crate::db::ContactCache;
use crate::error::Result;
use crate::gateway::ContactGateway;
use crate::models::LocalContactRecord;
use crate::util::user_fingerprint;

/// Upper bound on listing pages per sync, guards against a looping page token
const MAX_PAGES: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Contacts written to the cache
    pub synced_count: usize,
    /// Contacts returned by the remote listing
    pub total_from_remote: usize,
}

/// Page through the remote listing and write every contact through to the
/// cache for `user`.
///
/// Contacts without a resource id are counted but not cached. Cached contacts
/// that disappeared remotely are left in place.
pub async fn sync_contacts(
    gateway: &dyn ContactGateway,
    cache: &dyn ContactCache,
    user: &str,
) -> Result<SyncReport> {
    let (report, exhausted) = sync_pages(gateway, cache, user, MAX_PAGES).await?;
    if !exhausted {
        tracing::warn!(
            user = user_fingerprint(user),
            max_pages = MAX_PAGES,
            synced = report.synced_count,
            "Contact sync stopped at page limit, listing not exhausted"
        );
    }

    tracing::info!(
        user = user_fingerprint(user),
        synced = report.synced_count,
        total = report.total_from_remote,
        "Contact sync finished"
    );
    Ok(report)
}

/// Sync at most `max_pages` listing pages. The flag is false when the
/// listing still had a next page token at the limit.
async fn sync_pages(
    gateway: &dyn ContactGateway,
    cache: &dyn ContactCache,
    user: &str,
    max_pages: usize,
) -> Result<(SyncReport, bool)> {
    let mut report = SyncReport::default();
    let mut exhausted = false;
    let mut page_token: Option<String> = None;

    for page_number in 1..=max_pages {
        let page = gateway.list_contacts(page_token.as_deref()).await?;
        report.total_from_remote += page.contacts.len();

        for remote in &page.contacts {
            if remote.resource_id.trim().is_empty() {
                continue;
            }
            cache
                .write_through(&LocalContactRecord::from_remote(user, remote))
                .await?;
            report.synced_count += 1;
        }

        tracing::debug!(
            user = user_fingerprint(user),
            page = page_number,
            contacts = page.contacts.len(),
            "Synced contact page"
        );

        match page.next_page_token.filter(|token| !token.is_empty()) {
            Some(token) => page_token = Some(token),
            None => {
                exhausted = true;
                break;
            }
        }
    }

    Ok((report, exhausted))
}
