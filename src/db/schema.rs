/// Schema for the local database.
///
/// `durable_store` and `session_store` are flat key/value tables backing the
/// durable and session-backup cache tiers. `pending_writes` is the
/// authoritative offline queue; AUTOINCREMENT keeps ids monotonic so a clear
/// instruction can name the last id it covers.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS durable_store (
    key TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS session_store (
    key TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS pending_writes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pending_writes_kind ON pending_writes(kind, id);
"#;
