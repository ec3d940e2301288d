//! Local contact cache implementation

use async_trait::async_trait;
use libsql::{params, Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::LocalContactRecord;

/// Per-user mirror of the last known remote contact state
#[async_trait]
pub trait ContactCache: Send + Sync {
    /// Find a cached contact by remote identity
    async fn find(&self, resource_id: &str, user: &str) -> Result<Option<LocalContactRecord>>;

    /// Insert or replace a cached contact
    ///
    /// Re-applying the same remote state is harmless.
    async fn write_through(&self, record: &LocalContactRecord) -> Result<()>;

    /// List every cached contact for a user, ordered by name
    async fn list_for_user(&self, user: &str) -> Result<Vec<LocalContactRecord>>;
}

/// libSQL implementation of `ContactCache`
#[derive(Clone)]
pub struct LibSqlContactCache {
    conn: Connection,
}

impl LibSqlContactCache {
    /// Create a new cache over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Parse a contact from a database row
    fn parse_contact(row: &Row) -> Result<LocalContactRecord> {
        let raw_json: String = row.get(5)?;
        Ok(LocalContactRecord {
            user: row.get(0)?,
            resource_id: row.get(1)?,
            version_token: row.get(2)?,
            display_name: row.get(3)?,
            phone_number: row.get(4)?,
            raw_snapshot: serde_json::from_str(&raw_json)?,
        })
    }
}

#[async_trait]
impl ContactCache for LibSqlContactCache {
    async fn find(&self, resource_id: &str, user: &str) -> Result<Option<LocalContactRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user, resource_id, version_token, display_name, phone_number, raw_json
                 FROM contacts
                 WHERE resource_id = ? AND user = ?",
                [resource_id, user],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Self::parse_contact(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn write_through(&self, record: &LocalContactRecord) -> Result<()> {
        if record.resource_id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Cannot cache a contact without a resource id".to_string(),
            ));
        }

        let raw_json = serde_json::to_string(&record.raw_snapshot)?;
        let phone_number = record
            .phone_number
            .clone()
            .map_or(Value::Null, Value::Text);
        let now = chrono::Utc::now().timestamp_millis();

        self.conn
            .execute(
                "INSERT OR REPLACE INTO contacts
                 (user, resource_id, version_token, display_name, phone_number, raw_json, synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.user.as_str(),
                    record.resource_id.as_str(),
                    record.version_token.as_str(),
                    record.display_name.as_str(),
                    phone_number,
                    raw_json,
                    now
                ],
            )
            .await?;

        Ok(())
    }

    async fn list_for_user(&self, user: &str) -> Result<Vec<LocalContactRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user, resource_id, version_token, display_name, phone_number, raw_json
                 FROM contacts
                 WHERE user = ?
                 ORDER BY display_name COLLATE NOCASE ASC, resource_id ASC",
                [user],
            )
            .await?;

        let mut contacts = Vec::new();
        while let Some(row) = rows.next().await? {
            contacts.push(Self::parse_contact(&row)?);
        }
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> (Database, LibSqlContactCache) {
        let db = Database::open_in_memory().await.unwrap();
        let cache = LibSqlContactCache::new(db.connection().clone());
        (db, cache)
    }

    fn record(user: &str, resource_id: &str, name: &str, etag: &str) -> LocalContactRecord {
        LocalContactRecord {
            resource_id: resource_id.to_string(),
            user: user.to_string(),
            version_token: etag.to_string(),
            display_name: name.to_string(),
            phone_number: Some("0412 345 678".to_string()),
            raw_snapshot: json!({"resourceName": resource_id, "etag": etag}),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_through_and_find() {
        let (_db, cache) = setup().await;
        let contact = record("ada@example.com", "people/c1", "Ada", "etag-1");

        cache.write_through(&contact).await.unwrap();

        let found = cache
            .find("people/c1", "ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, contact);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_find_is_scoped_to_user() {
        let (_db, cache) = setup().await;
        cache
            .write_through(&record("ada@example.com", "people/c1", "Ada", "etag-1"))
            .await
            .unwrap();

        let other = cache.find("people/c1", "grace@example.com").await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_through_replaces_version_token() {
        let (_db, cache) = setup().await;
        cache
            .write_through(&record("ada@example.com", "people/c1", "Ada", "etag-1"))
            .await
            .unwrap();
        let mut newer = record("ada@example.com", "people/c1", "Ada", "etag-2");
        newer.phone_number = None;
        cache.write_through(&newer).await.unwrap();
        // Same state twice is harmless
        cache.write_through(&newer).await.unwrap();

        let found = cache
            .find("people/c1", "ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.version_token, "etag-2");
        assert_eq!(found.phone_number, None);

        let all = cache.list_for_user("ada@example.com").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_for_user_orders_by_name() {
        let (_db, cache) = setup().await;
        cache
            .write_through(&record("ada@example.com", "people/c2", "zed", "e"))
            .await
            .unwrap();
        cache
            .write_through(&record("ada@example.com", "people/c1", "Bob", "e"))
            .await
            .unwrap();
        cache
            .write_through(&record("grace@example.com", "people/c3", "Amy", "e"))
            .await
            .unwrap();

        let names: Vec<String> = cache
            .list_for_user("ada@example.com")
            .await
            .unwrap()
            .into_iter()
            .map(|contact| contact.display_name)
            .collect();
        assert_eq!(names, vec!["Bob".to_string(), "zed".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_through_rejects_blank_resource_id() {
        let (_db, cache) = setup().await;
        let err = cache
            .write_through(&record("ada@example.com", " ", "Ada", "e"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
