//! v001 -- Initial schema creation.
//!
//! Creates the `records`, `settings` and `blobs` tables.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Records (JSON documents grouped by resource)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS records (
    resource   TEXT NOT NULL,
    id         TEXT NOT NULL,
    body       TEXT NOT NULL,                 -- JSON object
    created_at TEXT NOT NULL,                 -- RFC-3339, microsecond precision
    unique_key TEXT,                          -- natural key, NULL if none

    PRIMARY KEY (resource, id),
    UNIQUE (resource, unique_key)
);

CREATE INDEX IF NOT EXISTS idx_records_resource_created
    ON records(resource, created_at, id);

-- ----------------------------------------------------------------
-- Device-local settings
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS settings (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Blobs (uploaded file metadata)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blobs (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    bucket       TEXT NOT NULL,
    path         TEXT NOT NULL,
    size         INTEGER NOT NULL,
    blake3_hash  TEXT NOT NULL,
    content_type TEXT NOT NULL,
    created_at   TEXT NOT NULL,

    UNIQUE (bucket, path)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
