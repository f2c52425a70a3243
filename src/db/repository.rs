use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tokio::sync::Notify;
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{now_millis, Entity, Table};

use super::changes::ChangeKind;
use super::schema::{SCHEMA, SCHEMA_VERSION};

#[derive(Clone)]
pub struct Repository {
    pub(super) conn: Connection,
    local_changes: Arc<Notify>,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        let found = conn
            .call(|conn| {
                let version: i64 =
                    conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
                if version != 0 && version != SCHEMA_VERSION {
                    return Ok(version);
                }
                conn.execute_batch(SCHEMA)?;
                conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
                Ok(SCHEMA_VERSION)
            })
            .await?;

        if found != SCHEMA_VERSION {
            return Err(AppError::SchemaVersion {
                found,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(Self {
            conn,
            local_changes: Arc::new(Notify::new()),
        })
    }

    pub fn local_changes(&self) -> Arc<Notify> {
        Arc::clone(&self.local_changes)
    }

    // Typed entity operations

    pub async fn get<T: Entity>(&self, key: &str) -> Result<Option<T>> {
        let data = self.fetch_data(T::TABLE, key).await?;
        data.map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(AppError::from)
    }

    pub async fn put<T: Entity>(&self, entity: &T) -> Result<()> {
        let value = serde_json::to_value(entity)?;
        self.put_value(T::TABLE, value).await
    }

    pub async fn scan<T: Entity>(&self) -> Result<Vec<T>> {
        let rows = self.scan_data(T::TABLE, None).await?;
        decode_rows(&rows)
    }

    /// `field` may be given either as the JSON field name (`feedId`) or the
    /// column name (`feed_id`).
    pub async fn scan_by_index<T: Entity>(&self, field: &str, value: &str) -> Result<Vec<T>> {
        let table = T::TABLE;
        let column = match table.index() {
            Some((json_field, column)) if field == json_field || field == column => column,
            _ => {
                return Err(AppError::UnknownIndex {
                    table: table.name(),
                    field: field.to_string(),
                })
            }
        };
        let rows = self
            .scan_data(table, Some((column, value.to_string())))
            .await?;
        decode_rows(&rows)
    }

    // Untyped row operations (used by the sync engine)

    pub async fn get_value(&self, table: Table, key: &str) -> Result<Option<Value>> {
        let data = self.fetch_data(table, key).await?;
        data.map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(AppError::from)
    }

    pub async fn put_value(&self, table: Table, mut value: Value) -> Result<()> {
        let (key, index) = row_parts(table, &value)?;

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let kind = match read_row(&tx, table, &key)? {
                    Some(existing) => {
                        let previous: Value = serde_json::from_str(&existing).map_err(other)?;
                        keep_updated_at_monotonic(&mut value, &previous);
                        ChangeKind::Updated
                    }
                    None => ChangeKind::Created,
                };
                let data = value.to_string();
                write_row(&tx, table, &key, index.as_deref(), &data)?;
                tx.execute(
                    "INSERT INTO sync_changes (table_name, row_key, kind, data) VALUES (?1, ?2, ?3, ?4)",
                    params![table.name(), key, kind.as_str(), data],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        self.local_changes.notify_one();
        Ok(())
    }

    /// Remote rows are not recorded in the change feed.
    pub async fn apply_remote(&self, table: Table, mut value: Value) -> Result<()> {
        let (key, index) = row_parts(table, &value)?;
        table
            .validate(&value)
            .map_err(|e| AppError::InvalidEntity {
                table: table.name(),
                reason: e.to_string(),
            })?;

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if let Some(existing) = read_row(&tx, table, &key)? {
                    let previous: Value = serde_json::from_str(&existing).map_err(other)?;
                    if same_content(&value, &previous) {
                        return Ok(());
                    }
                    keep_updated_at_monotonic(&mut value, &previous);
                }
                write_row(&tx, table, &key, index.as_deref(), &value.to_string())?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Returns `false` when the row is absent or already tombstoned.
    pub async fn apply_remote_delete(&self, table: Table, key: &str) -> Result<bool> {
        let key = key.to_string();

        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(existing) = read_row(&tx, table, &key)? else {
                    return Ok(false);
                };
                let mut value: Value = serde_json::from_str(&existing).map_err(other)?;
                if value.get("deleted").and_then(Value::as_bool) == Some(true) {
                    return Ok(false);
                }
                let previous = value.get("updatedAt").and_then(Value::as_i64).unwrap_or(0);
                if let Some(object) = value.as_object_mut() {
                    object.insert("deleted".into(), Value::Bool(true));
                    object.insert("updatedAt".into(), Value::from(now_millis().max(previous + 1)));
                }
                tx.execute(
                    &format!(
                        "UPDATE {} SET data = ?1 WHERE {} = ?2",
                        table.name(),
                        table.key_column()
                    ),
                    params![value.to_string(), key],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(changed)
    }

    async fn fetch_data(&self, table: Table, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let data = self
            .conn
            .call(move |conn| Ok(read_row(conn, table, &key)?))
            .await?;
        Ok(data)
    }

    async fn scan_data(
        &self,
        table: Table,
        filter: Option<(&'static str, String)>,
    ) -> Result<Vec<String>> {
        let rows = self
            .conn
            .call(move |conn| {
                let rows = match filter {
                    Some((column, value)) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT data FROM {} WHERE {} = ?1 ORDER BY rowid",
                            table.name(),
                            column
                        ))?;
                        let rows = stmt
                            .query_map(params![value], |row| row.get::<_, String>(0))?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let mut stmt = conn
                            .prepare(&format!("SELECT data FROM {} ORDER BY rowid", table.name()))?;
                        let rows = stmt
                            .query_map([], |row| row.get::<_, String>(0))?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }
}

fn read_row(
    conn: &rusqlite::Connection,
    table: Table,
    key: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        &format!(
            "SELECT data FROM {} WHERE {} = ?1",
            table.name(),
            table.key_column()
        ),
        params![key],
        |row| row.get(0),
    )
    .optional()
}

fn write_row(
    conn: &rusqlite::Connection,
    table: Table,
    key: &str,
    index: Option<&str>,
    data: &str,
) -> rusqlite::Result<()> {
    let name = table.name();
    let key_column = table.key_column();
    match table.index() {
        Some((_, column)) => conn.execute(
            &format!(
                r#"INSERT INTO {name} ({key_column}, {column}, data) VALUES (?1, ?2, ?3)
                   ON CONFLICT({key_column}) DO UPDATE SET
                       {column} = excluded.{column},
                       data = excluded.data"#
            ),
            params![key, index, data],
        )?,
        None => conn.execute(
            &format!(
                r#"INSERT INTO {name} ({key_column}, data) VALUES (?1, ?2)
                   ON CONFLICT({key_column}) DO UPDATE SET data = excluded.data"#
            ),
            params![key, data],
        )?,
    };
    Ok(())
}

fn row_parts(table: Table, value: &Value) -> Result<(String, Option<String>)> {
    let invalid = |reason: String| AppError::InvalidEntity {
        table: table.name(),
        reason,
    };

    let object = value
        .as_object()
        .ok_or_else(|| invalid("expected a JSON object".to_string()))?;

    let key = match object.get(table.key_field()) {
        Some(Value::String(key)) if !key.is_empty() => key.clone(),
        _ => return Err(invalid(format!("missing {}", table.key_field()))),
    };

    let index = table
        .index()
        .and_then(|(field, _)| object.get(field))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok((key, index))
}

fn keep_updated_at_monotonic(value: &mut Value, previous: &Value) {
    let Some(previous) = previous.get("updatedAt").and_then(Value::as_i64) else {
        return;
    };
    let current = value.get("updatedAt").and_then(Value::as_i64);
    if current.map_or(true, |current| current <= previous) {
        if let Some(object) = value.as_object_mut() {
            object.insert("updatedAt".into(), Value::from(previous + 1));
        }
    }
}

fn same_content(a: &Value, b: &Value) -> bool {
    match (a.as_object(), b.as_object()) {
        (Some(a), Some(b)) => {
            let a = a.iter().filter(|(field, _)| *field != "updatedAt");
            let b = b.iter().filter(|(field, _)| *field != "updatedAt");
            a.eq(b)
        }
        _ => a == b,
    }
}

fn decode_rows<T: Entity>(rows: &[String]) -> Result<Vec<T>> {
    rows.iter()
        .map(|data| serde_json::from_str(data).map_err(AppError::from))
        .collect()
}

pub(super) fn other<E>(err: E) -> tokio_rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    tokio_rusqlite::Error::Other(Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Feed, FeedItem, UserSubscription};
    use serde_json::json;

    fn subscription(feed_id: &str, url: &str, updated_at: i64) -> UserSubscription {
        UserSubscription {
            feed_id: feed_id.to_string(),
            url: url.to_string(),
            user_id: "google:1".to_string(),
            created_at: updated_at,
            updated_at,
            deleted: false,
            requested_frequency: 600,
        }
    }

    fn item(guid: &str, feed_id: &str) -> FeedItem {
        serde_json::from_value(json!({ "guid": guid, "feedId": feed_id, "title": guid }))
            .unwrap()
    }

    #[tokio::test]
    async fn get_missing_row_is_none() {
        let repo = Repository::open_in_memory().await.unwrap();
        let feed: Option<Feed> = repo.get("nope").await.unwrap();
        assert!(feed.is_none());
    }

    #[tokio::test]
    async fn put_overwrites_existing_row() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.put(&subscription("a", "https://one.example/rss", 10))
            .await
            .unwrap();
        repo.put(&subscription("a", "https://two.example/rss", 20))
            .await
            .unwrap();

        let stored: UserSubscription = repo.get("a").await.unwrap().unwrap();
        assert_eq!(stored.url, "https://two.example/rss");
        assert_eq!(stored.updated_at, 20);
        assert_eq!(repo.scan::<UserSubscription>().await.unwrap().len(), 1);

        let by_old_url: Vec<UserSubscription> = repo
            .scan_by_index("url", "https://one.example/rss")
            .await
            .unwrap();
        assert!(by_old_url.is_empty());
    }

    #[tokio::test]
    async fn put_keeps_updated_at_increasing() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.put(&subscription("a", "https://x.example", 500))
            .await
            .unwrap();
        repo.put(&subscription("a", "https://x.example", 100))
            .await
            .unwrap();

        let stored: UserSubscription = repo.get("a").await.unwrap().unwrap();
        assert_eq!(stored.updated_at, 501);
    }

    #[tokio::test]
    async fn scan_returns_fresh_snapshot_in_insertion_order() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.put(&item("g1", "f1")).await.unwrap();
        repo.put(&item("g2", "f2")).await.unwrap();

        let first: Vec<FeedItem> = repo.scan().await.unwrap();
        repo.put(&item("g3", "f1")).await.unwrap();
        let second: Vec<FeedItem> = repo.scan().await.unwrap();

        assert_eq!(first.len(), 2);
        let guids: Vec<_> = second.iter().map(|i| i.guid.as_str()).collect();
        assert_eq!(guids, vec!["g1", "g2", "g3"]);
    }

    #[tokio::test]
    async fn scan_by_index_filters_rows() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.put(&item("g1", "f1")).await.unwrap();
        repo.put(&item("g2", "f2")).await.unwrap();
        repo.put(&item("g3", "f1")).await.unwrap();

        let items: Vec<FeedItem> = repo.scan_by_index("feedId", "f1").await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.feed_id == "f1"));

        let by_column: Vec<FeedItem> = repo.scan_by_index("feed_id", "f2").await.unwrap();
        assert_eq!(by_column.len(), 1);
    }

    #[tokio::test]
    async fn scan_by_unknown_index_fails() {
        let repo = Repository::open_in_memory().await.unwrap();
        let result = repo.scan_by_index::<Feed>("url", "x").await;
        assert!(matches!(result, Err(AppError::UnknownIndex { .. })));
    }

    #[tokio::test]
    async fn remote_apply_is_idempotent() {
        let repo = Repository::open_in_memory().await.unwrap();
        let row = json!({ "feedId": "f1", "url": "https://x.example/rss", "title": "X", "updatedAt": 7 });

        repo.apply_remote(Table::Feeds, row.clone()).await.unwrap();
        let once = repo.get_value(Table::Feeds, "f1").await.unwrap();
        repo.apply_remote(Table::Feeds, row).await.unwrap();
        let twice = repo.get_value(Table::Feeds, "f1").await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(repo.scan::<Feed>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remote_apply_never_moves_updated_at_back() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.put_value(
            Table::Feeds,
            json!({ "feedId": "f1", "url": "https://x.example/rss", "updatedAt": 500 }),
        )
        .await
        .unwrap();

        let older = json!({ "feedId": "f1", "url": "https://y.example/rss", "updatedAt": 100 });
        repo.apply_remote(Table::Feeds, older.clone()).await.unwrap();
        let feed: Feed = repo.get("f1").await.unwrap().unwrap();
        assert_eq!(feed.url, "https://y.example/rss");
        assert_eq!(feed.updated_at, 501);

        repo.apply_remote(Table::Feeds, older).await.unwrap();
        let replayed: Feed = repo.get("f1").await.unwrap().unwrap();
        assert_eq!(replayed.updated_at, 501);

        repo.apply_remote(
            Table::Feeds,
            json!({ "feedId": "f1", "url": "https://z.example/rss", "updatedAt": 900 }),
        )
        .await
        .unwrap();
        let newer: Feed = repo.get("f1").await.unwrap().unwrap();
        assert_eq!(newer.updated_at, 900);
    }

    #[tokio::test]
    async fn remote_apply_rejects_rows_without_key() {
        let repo = Repository::open_in_memory().await.unwrap();
        let result = repo
            .apply_remote(Table::FeedItems, json!({ "feedId": "f1" }))
            .await;
        assert!(matches!(result, Err(AppError::InvalidEntity { .. })));
    }

    #[tokio::test]
    async fn remote_apply_rejects_rows_of_the_wrong_shape() {
        let repo = Repository::open_in_memory().await.unwrap();
        let result = repo
            .apply_remote(Table::UserSubscriptions, json!({ "feedId": "s1", "url": "x" }))
            .await;
        assert!(matches!(result, Err(AppError::InvalidEntity { .. })));
        assert!(repo.get_value(Table::UserSubscriptions, "s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remote_delete_tombstones_once() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.apply_remote(
            Table::Feeds,
            json!({ "feedId": "f1", "url": "https://x.example/rss", "updatedAt": 7 }),
        )
        .await
        .unwrap();

        assert!(repo.apply_remote_delete(Table::Feeds, "f1").await.unwrap());
        let after_first = repo.get_value(Table::Feeds, "f1").await.unwrap();
        assert!(!repo.apply_remote_delete(Table::Feeds, "f1").await.unwrap());
        let after_second = repo.get_value(Table::Feeds, "f1").await.unwrap();

        assert_eq!(after_first, after_second);
        let feed: Feed = repo.get("f1").await.unwrap().unwrap();
        assert!(feed.deleted);
        assert!(feed.updated_at > 7);

        assert!(!repo.apply_remote_delete(Table::Feeds, "missing").await.unwrap());
    }

    #[tokio::test]
    async fn reopening_file_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let path = path.to_str().unwrap();

        {
            let repo = Repository::new(path).await.unwrap();
            repo.put(&subscription("a", "https://x.example", 1))
                .await
                .unwrap();
        }

        let repo = Repository::new(path).await.unwrap();
        let stored: Option<UserSubscription> = repo.get("a").await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn rejects_other_schema_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        let path = path.to_str().unwrap();

        {
            let conn = rusqlite::Connection::open(path).unwrap();
            conn.pragma_update(None, "user_version", 7).unwrap();
        }

        let result = Repository::new(path).await;
        assert!(matches!(
            result,
            Err(AppError::SchemaVersion { found: 7, expected: 1 })
        ));
    }
}
