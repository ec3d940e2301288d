//! Staged change store implementation

use async_trait::async_trait;
use libsql::{params, Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{ChangeAction, NewStagedChange, StagedChange, StagedSummary};

/// Durable per-user storage of pending phone number decisions
#[async_trait]
pub trait StagedChangeStore: Send + Sync {
    /// Stage a decision, replacing any earlier decision for the same contact
    ///
    /// An existing entry keeps its `created_at`.
    async fn stage(&self, user: &str, change: NewStagedChange) -> Result<StagedChange>;

    /// List a user's staged changes, most recently created first
    async fn list_for_user(&self, user: &str) -> Result<Vec<StagedChange>>;

    /// Per-action counts of a user's staged changes
    async fn summary(&self, user: &str) -> Result<StagedSummary>;

    /// Check whether a contact already has a staged decision
    async fn is_staged(&self, user: &str, resource_id: &str) -> Result<bool>;

    /// Remove one staged change; returns whether it existed
    async fn remove(&self, user: &str, resource_id: &str) -> Result<bool>;

    /// Remove every staged change for a user; returns the number removed
    async fn clear_for_user(&self, user: &str) -> Result<u64>;
}

/// libSQL implementation of `StagedChangeStore`
#[derive(Clone)]
pub struct LibSqlStagedChangeStore {
    conn: Connection,
}

impl LibSqlStagedChangeStore {
    /// Create a new store over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Parse a staged change from a database row
    fn parse_change(row: &Row) -> Result<StagedChange> {
        let action: String = row.get(4)?;
        Ok(StagedChange {
            resource_id: row.get(0)?,
            contact_name: row.get(1)?,
            original_phone: row.get(2)?,
            proposed_phone: row.get(3)?,
            action: action.parse()?,
            proposed_name: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    async fn get(&self, user: &str, resource_id: &str) -> Result<Option<StagedChange>> {
        let mut rows = self
            .conn
            .query(
                "SELECT resource_id, contact_name, original_phone, proposed_phone, action,
                        proposed_name, created_at, updated_at
                 FROM staged_changes
                 WHERE user = ? AND resource_id = ?",
                [user, resource_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Self::parse_change(&row).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StagedChangeStore for LibSqlStagedChangeStore {
    async fn stage(&self, user: &str, change: NewStagedChange) -> Result<StagedChange> {
        let change = change.normalized()?;
        let now = chrono::Utc::now().timestamp_millis();
        let proposed_name = change.proposed_name.clone().map_or(Value::Null, Value::Text);

        self.conn
            .execute(
                "INSERT INTO staged_changes
                 (user, resource_id, contact_name, original_phone, proposed_phone, action,
                  proposed_name, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(user, resource_id) DO UPDATE SET
                    contact_name = excluded.contact_name,
                    original_phone = excluded.original_phone,
                    proposed_phone = excluded.proposed_phone,
                    action = excluded.action,
                    proposed_name = excluded.proposed_name,
                    updated_at = excluded.updated_at",
                params![
                    user,
                    change.resource_id.as_str(),
                    change.contact_name.as_str(),
                    change.original_phone.as_str(),
                    change.proposed_phone.as_str(),
                    change.action.as_str(),
                    proposed_name,
                    now,
                    now
                ],
            )
            .await?;

        self.get(user, &change.resource_id)
            .await?
            .ok_or_else(|| Error::NotFound(change.resource_id.clone()))
    }

    async fn list_for_user(&self, user: &str) -> Result<Vec<StagedChange>> {
        let mut rows = self
            .conn
            .query(
                "SELECT resource_id, contact_name, original_phone, proposed_phone, action,
                        proposed_name, created_at, updated_at
                 FROM staged_changes
                 WHERE user = ?
                 ORDER BY created_at DESC, id DESC",
                [user],
            )
            .await?;

        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(Self::parse_change(&row)?);
        }
        Ok(changes)
    }

    async fn summary(&self, user: &str) -> Result<StagedSummary> {
        let mut rows = self
            .conn
            .query(
                "SELECT action, COUNT(*) FROM staged_changes WHERE user = ? GROUP BY action",
                [user],
            )
            .await?;

        let mut summary = StagedSummary::default();
        while let Some(row) = rows.next().await? {
            let action: ChangeAction = row.get::<String>(0)?.parse()?;
            let count = usize::try_from(row.get::<i64>(1)?)
                .map_err(|_| Error::Database("Negative staged change count".to_string()))?;
            summary.add(action, count);
        }
        Ok(summary)
    }

    async fn is_staged(&self, user: &str, resource_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM staged_changes WHERE user = ? AND resource_id = ?",
                [user, resource_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn remove(&self, user: &str, resource_id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM staged_changes WHERE user = ? AND resource_id = ?",
                [user, resource_id],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn clear_for_user(&self, user: &str) -> Result<u64> {
        let removed = self
            .conn
            .execute("DELETE FROM staged_changes WHERE user = ?", [user])
            .await?;
        Ok(removed)
    }
}
