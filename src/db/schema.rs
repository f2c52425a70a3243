/// Stamped into `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = r#"
-- feeds table (server-owned cache)
CREATE TABLE IF NOT EXISTS feeds (
    feed_id TEXT PRIMARY KEY NOT NULL,
    data TEXT NOT NULL
);

-- feed_items table
CREATE TABLE IF NOT EXISTS feed_items (
    guid TEXT PRIMARY KEY NOT NULL,
    feed_id TEXT,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feed_items_feed_id ON feed_items(feed_id);

-- user_feed_item_reads table
CREATE TABLE IF NOT EXISTS user_feed_item_reads (
    guid TEXT PRIMARY KEY NOT NULL,
    data TEXT NOT NULL
);

-- user_subscriptions table
CREATE TABLE IF NOT EXISTS user_subscriptions (
    feed_id TEXT PRIMARY KEY NOT NULL,
    url TEXT,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_user_subscriptions_url ON user_subscriptions(url);

-- db_metadata table (sync engine state only)
CREATE TABLE IF NOT EXISTS db_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

-- sync_changes table (local writes not yet acknowledged by the server)
CREATE TABLE IF NOT EXISTS sync_changes (
    rev INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    row_key TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('created', 'updated')),
    data TEXT NOT NULL,
    recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
