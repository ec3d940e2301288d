//! In-memory fakes for push engine and sync tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::pacer::{Sleeper, WaitReason};
use crate::db::{ContactCache, StagedChangeStore};
use crate::error::{Error, Result};
use crate::gateway::{ContactGateway, ContactPage, GatewayError, GatewayResult};
use crate::models::{
    ChangeAction, ContactUpdate, LocalContactRecord, NewStagedChange, RemoteContact, StagedChange,
    StagedSummary,
};

pub const USER: &str = "ada@example.com";
pub const PROPOSED_PHONE: &str = "+14155550100";

pub fn staged(resource_id: &str, name: &str, action: ChangeAction) -> StagedChange {
    StagedChange {
        resource_id: resource_id.to_string(),
        contact_name: name.to_string(),
        original_phone: "415 555 0100".to_string(),
        proposed_phone: PROPOSED_PHONE.to_string(),
        action,
        proposed_name: None,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn cached_contact(resource_id: &str, name: &str, version_token: &str) -> LocalContactRecord {
    LocalContactRecord {
        resource_id: resource_id.to_string(),
        user: USER.to_string(),
        version_token: version_token.to_string(),
        display_name: name.to_string(),
        phone_number: Some("415 555 0100".to_string()),
        raw_snapshot: json!({"resourceName": resource_id}),
    }
}

#[derive(Default)]
struct GatewayState {
    remotes: HashMap<String, RemoteContact>,
    etag_seq: u64,
    fetch_failures: VecDeque<GatewayError>,
    update_failures: VecDeque<GatewayError>,
    touched: Vec<String>,
    fetch_calls: usize,
    update_calls: usize,
    list_calls: usize,
}

impl GatewayState {
    fn next_etag(&mut self) -> String {
        self.etag_seq += 1;
        format!("etag-{}", self.etag_seq)
    }
}

/// Versioned remote directory held in memory
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
    always_rate_limited: bool,
    page_size: Option<usize>,
    list_failure: Option<GatewayError>,
}

impl FakeGateway {
    /// Every conditional update answers with a rate-limit signal
    pub fn always_rate_limited(mut self) -> Self {
        self.always_rate_limited = true;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn failing_list(mut self, error: GatewayError) -> Self {
        self.list_failure = Some(error);
        self
    }

    pub fn add_remote(&self, resource_id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let version_token = state.next_etag();
        state.remotes.insert(
            resource_id.to_string(),
            RemoteContact {
                resource_id: resource_id.to_string(),
                version_token,
                display_name: Some(name.to_string()),
                phone_number: Some("415 555 0100".to_string()),
                raw: json!({"resourceName": resource_id}),
            },
        );
    }

    pub fn fail_fetches(&self, errors: Vec<GatewayError>) {
        self.state.lock().unwrap().fetch_failures.extend(errors);
    }

    pub fn fail_updates(&self, errors: Vec<GatewayError>) {
        self.state.lock().unwrap().update_failures.extend(errors);
    }

    pub fn remote(&self, resource_id: &str) -> Option<RemoteContact> {
        self.state.lock().unwrap().remotes.get(resource_id).cloned()
    }

    /// Resource ids fetched, in call order, without consecutive repeats
    pub fn touched(&self) -> Vec<String> {
        self.state.lock().unwrap().touched.clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().unwrap().fetch_calls
    }

    pub fn update_calls(&self) -> usize {
        self.state.lock().unwrap().update_calls
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

#[async_trait]
impl ContactGateway for FakeGateway {
    async fn fetch(&self, resource_id: &str) -> GatewayResult<RemoteContact> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls += 1;
        if state.touched.last().map(String::as_str) != Some(resource_id) {
            state.touched.push(resource_id.to_string());
        }
        if let Some(error) = state.fetch_failures.pop_front() {
            return Err(error);
        }
        state
            .remotes
            .get(resource_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(resource_id.to_string()))
    }

    async fn conditional_update(
        &self,
        resource_id: &str,
        version_token: &str,
        update: &ContactUpdate,
    ) -> GatewayResult<RemoteContact> {
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;
        if self.always_rate_limited {
            return Err(GatewayError::RateLimited("HTTP 429".to_string()));
        }
        if let Some(error) = state.update_failures.pop_front() {
            return Err(error);
        }

        let next_etag = state.next_etag();
        let remote = state
            .remotes
            .get_mut(resource_id)
            .ok_or_else(|| GatewayError::NotFound(resource_id.to_string()))?;
        if remote.version_token != version_token {
            return Err(GatewayError::VersionConflict(format!(
                "expected {}, got {version_token}",
                remote.version_token
            )));
        }
        if let Some(phone) = &update.phone {
            remote.phone_number = Some(phone.clone());
        }
        if let Some(name) = &update.name {
            remote.display_name = Some(name.clone());
        }
        remote.version_token = next_etag;
        Ok(remote.clone())
    }

    async fn list_contacts(&self, page_token: Option<&str>) -> GatewayResult<ContactPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if let Some(error) = &self.list_failure {
            return Err(error.clone());
        }

        let mut contacts: Vec<RemoteContact> = state.remotes.values().cloned().collect();
        contacts.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));

        let start: usize = page_token.and_then(|token| token.parse().ok()).unwrap_or(0);
        let page_size = self.page_size.unwrap_or(contacts.len().max(1));
        let end = (start + page_size).min(contacts.len());
        let next_page_token = (end < contacts.len()).then(|| end.to_string());

        Ok(ContactPage {
            contacts: contacts[start.min(end)..end].to_vec(),
            next_page_token,
        })
    }
}

/// Staged change store keeping insertion order
#[derive(Default)]
pub struct MemoryStagedStore {
    changes: Mutex<Vec<(String, StagedChange)>>,
    fail_list: Mutex<bool>,
    fail_clear: Mutex<bool>,
    clear_calls: AtomicUsize,
}

impl MemoryStagedStore {
    pub fn insert(&self, user: &str, change: StagedChange) {
        self.changes
            .lock()
            .unwrap()
            .push((user.to_string(), change));
    }

    pub fn list(&self, user: &str) -> Vec<StagedChange> {
        self.changes
            .lock()
            .unwrap()
            .iter()
            .filter(|(owner, _)| owner == user)
            .map(|(_, change)| change.clone())
            .collect()
    }

    pub fn set_proposed_name(&self, user: &str, resource_id: &str, name: &str) {
        self.update(user, resource_id, |change| {
            change.proposed_name = Some(name.to_string());
        });
    }

    pub fn set_proposed_phone(&self, user: &str, resource_id: &str, phone: &str) {
        self.update(user, resource_id, |change| {
            change.proposed_phone = phone.to_string();
        });
    }

    pub fn fail_list(&self) {
        *self.fail_list.lock().unwrap() = true;
    }

    pub fn fail_clear(&self) {
        *self.fail_clear.lock().unwrap() = true;
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    fn update(&self, user: &str, resource_id: &str, apply: impl FnOnce(&mut StagedChange)) {
        let mut changes = self.changes.lock().unwrap();
        if let Some((_, change)) = changes
            .iter_mut()
            .find(|(owner, change)| owner == user && change.resource_id == resource_id)
        {
            apply(change);
        }
    }
}

#[async_trait]
impl StagedChangeStore for MemoryStagedStore {
    async fn stage(&self, user: &str, change: NewStagedChange) -> Result<StagedChange> {
        let change = change.normalized()?;
        let staged = StagedChange {
            resource_id: change.resource_id,
            contact_name: change.contact_name,
            original_phone: change.original_phone,
            proposed_phone: change.proposed_phone,
            action: change.action,
            proposed_name: change.proposed_name,
            created_at: 0,
            updated_at: 0,
        };
        let mut changes = self.changes.lock().unwrap();
        changes.retain(|(owner, existing)| {
            !(owner == user && existing.resource_id == staged.resource_id)
        });
        changes.push((user.to_string(), staged.clone()));
        Ok(staged)
    }

    async fn list_for_user(&self, user: &str) -> Result<Vec<StagedChange>> {
        if *self.fail_list.lock().unwrap() {
            return Err(Error::Database("staged list unavailable".to_string()));
        }
        Ok(self.list(user))
    }

    async fn summary(&self, user: &str) -> Result<StagedSummary> {
        let mut summary = StagedSummary::default();
        for change in self.list(user) {
            summary.add(change.action, 1);
        }
        Ok(summary)
    }

    async fn is_staged(&self, user: &str, resource_id: &str) -> Result<bool> {
        Ok(self
            .list(user)
            .iter()
            .any(|change| change.resource_id == resource_id))
    }

    async fn remove(&self, user: &str, resource_id: &str) -> Result<bool> {
        let mut changes = self.changes.lock().unwrap();
        let before = changes.len();
        changes.retain(|(owner, change)| !(owner == user && change.resource_id == resource_id));
        Ok(changes.len() != before)
    }

    async fn clear_for_user(&self, user: &str) -> Result<u64> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_clear.lock().unwrap() {
            return Err(Error::Database("staged clear unavailable".to_string()));
        }
        let mut changes = self.changes.lock().unwrap();
        let before = changes.len();
        changes.retain(|(owner, _)| owner != user);
        Ok((before - changes.len()) as u64)
    }
}

/// Contact cache keyed by (user, resource id)
#[derive(Default)]
pub struct MemoryContactCache {
    records: Mutex<HashMap<(String, String), LocalContactRecord>>,
    writes: AtomicUsize,
    fail_writes: Mutex<bool>,
}

impl MemoryContactCache {
    pub fn insert(&self, record: LocalContactRecord) {
        self.records
            .lock()
            .unwrap()
            .insert((record.user.clone(), record.resource_id.clone()), record);
    }

    pub fn get(&self, user: &str, resource_id: &str) -> Option<LocalContactRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(user.to_string(), resource_id.to_string()))
            .cloned()
    }

    /// Number of write-through calls that reached the cache
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }
}

#[async_trait]
impl ContactCache for MemoryContactCache {
    async fn find(&self, resource_id: &str, user: &str) -> Result<Option<LocalContactRecord>> {
        Ok(self.get(user, resource_id))
    }

    async fn write_through(&self, record: &LocalContactRecord) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if *self.fail_writes.lock().unwrap() {
            return Err(Error::Database("cache is read-only".to_string()));
        }
        self.insert(record.clone());
        Ok(())
    }

    async fn list_for_user(&self, user: &str) -> Result<Vec<LocalContactRecord>> {
        let mut records: Vec<LocalContactRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.user == user)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(records)
    }
}

/// Records every wait and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<(Duration, WaitReason)>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<(Duration, WaitReason)> {
        self.waits.lock().unwrap().clone()
    }

    pub fn throttle_waits(&self) -> Vec<Duration> {
        self.waits_for(WaitReason::Throttle)
    }

    pub fn backoff_waits(&self) -> Vec<Duration> {
        self.waits_for(WaitReason::Backoff)
    }

    fn waits_for(&self, reason: WaitReason) -> Vec<Duration> {
        self.waits()
            .into_iter()
            .filter(|(_, recorded)| *recorded == reason)
            .map(|(duration, _)| duration)
            .collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration, reason: WaitReason) {
        self.waits.lock().unwrap().push((duration, reason));
    }
}

/// Throttle waits never end; backoff waits return immediately
#[derive(Default)]
pub struct StuckThrottleSleeper;

#[async_trait]
impl Sleeper for StuckThrottleSleeper {
    async fn sleep(&self, _duration: Duration, reason: WaitReason) {
        if reason == WaitReason::Throttle {
            std::future::pending::<()>().await;
        }
    }
}
