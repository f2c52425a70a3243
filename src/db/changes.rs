use std::collections::HashMap;

use rusqlite::params;
use serde_json::Value;

use crate::error::Result;
use crate::models::Table;

use super::repository::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "created" => ChangeKind::Created,
            _ => ChangeKind::Updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalChange {
    pub rev: i64,
    pub table: Table,
    pub key: String,
    pub kind: ChangeKind,
    pub data: Value,
}

#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    pub changes: Vec<LocalChange>,
    /// Highest change-feed revision covered by `changes`.
    pub up_to_rev: i64,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl Repository {
    // One entry per row; a row created then updated is still reported as created.
    pub async fn pending_changes(&self) -> Result<PendingChanges> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT rev, table_name, row_key, kind, data FROM sync_changes ORDER BY rev",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut pending = PendingChanges::default();
        let mut positions: HashMap<(Table, String), usize> = HashMap::new();

        for (rev, table_name, key, kind, data) in rows {
            pending.up_to_rev = pending.up_to_rev.max(rev);

            let Some(table) = Table::ALL.into_iter().find(|t| t.name() == table_name) else {
                tracing::warn!("Ignoring change for unknown table {}", table_name);
                continue;
            };
            let data: Value = serde_json::from_str(&data)?;
            let kind = ChangeKind::parse(&kind);

            match positions.get(&(table, key.clone())) {
                Some(&i) => {
                    let change = &mut pending.changes[i];
                    change.rev = rev;
                    change.data = data;
                    if change.kind != ChangeKind::Created {
                        change.kind = kind;
                    }
                }
                None => {
                    positions.insert((table, key.clone()), pending.changes.len());
                    pending.changes.push(LocalChange {
                        rev,
                        table,
                        key,
                        kind,
                        data,
                    });
                }
            }
        }

        Ok(pending)
    }

    /// Stores the new cursor and drops change entries up to `up_to_rev` in one
    /// transaction.
    pub async fn commit_cycle(
        &self,
        cursor_key: &str,
        cursor: &str,
        up_to_rev: Option<i64>,
    ) -> Result<()> {
        let cursor_key = cursor_key.to_string();
        let cursor = cursor.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR REPLACE INTO db_metadata (key, value) VALUES (?1, ?2)",
                    params![cursor_key, cursor],
                )?;
                if let Some(up_to_rev) = up_to_rev {
                    tx.execute("DELETE FROM sync_changes WHERE rev <= ?1", params![up_to_rev])?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserSubscription;
    use serde_json::json;

    fn subscription(feed_id: &str, url: &str) -> UserSubscription {
        UserSubscription {
            feed_id: feed_id.to_string(),
            url: url.to_string(),
            user_id: "google:1".to_string(),
            created_at: 1,
            updated_at: 1,
            deleted: false,
            requested_frequency: 600,
        }
    }

    #[tokio::test]
    async fn local_writes_are_coalesced_per_row() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.put(&subscription("a", "https://one.example")).await.unwrap();
        repo.put(&subscription("b", "https://two.example")).await.unwrap();
        repo.put(&subscription("a", "https://three.example")).await.unwrap();

        let pending = repo.pending_changes().await.unwrap();
        assert_eq!(pending.changes.len(), 2);
        assert_eq!(pending.up_to_rev, 3);

        let a = &pending.changes[0];
        assert_eq!(a.key, "a");
        assert_eq!(a.kind, ChangeKind::Created);
        assert_eq!(a.data["url"], "https://three.example");
    }

    #[tokio::test]
    async fn remote_rows_are_not_recorded() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.apply_remote(
            Table::Feeds,
            json!({ "feedId": "f1", "url": "https://x.example/rss" }),
        )
        .await
        .unwrap();

        assert!(repo.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_cycle_keeps_later_writes() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.put(&subscription("a", "https://one.example")).await.unwrap();
        let pending = repo.pending_changes().await.unwrap();

        repo.put(&subscription("b", "https://two.example")).await.unwrap();
        repo.commit_cycle("lastPulledAt", "42", Some(pending.up_to_rev))
            .await
            .unwrap();

        let remaining = repo.pending_changes().await.unwrap();
        assert_eq!(remaining.changes.len(), 1);
        assert_eq!(remaining.changes[0].key, "b");
        assert_eq!(
            repo.get_metadata("lastPulledAt").await.unwrap().as_deref(),
            Some("42")
        );
    }

    #[tokio::test]
    async fn failed_commit_leaves_cursor_and_queue_alone() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.set_metadata("lastPulledAt", "10").await.unwrap();
        repo.put(&subscription("a", "https://one.example")).await.unwrap();
        let pending = repo.pending_changes().await.unwrap();

        repo.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER block_ack BEFORE DELETE ON sync_changes
                     BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let result = repo
            .commit_cycle("lastPulledAt", "20", Some(pending.up_to_rev))
            .await;
        assert!(result.is_err());
        assert_eq!(
            repo.get_metadata("lastPulledAt").await.unwrap().as_deref(),
            Some("10")
        );
        assert_eq!(repo.pending_changes().await.unwrap().changes.len(), 1);
    }
}
