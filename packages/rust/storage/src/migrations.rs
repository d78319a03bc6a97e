//! Schema migrations for the attachport database.
//!
//! Applied in ascending order on open; each migration records its version in
//! `schema_migrations`.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "content units, attachments, import markers",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS content_units (
    id           INTEGER PRIMARY KEY,
    kind         TEXT NOT NULL,
    body         TEXT NOT NULL DEFAULT '',
    excerpt      TEXT NOT NULL DEFAULT '',
    published_at TEXT NOT NULL,
    modified_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_content_units_kind ON content_units(kind, id);

CREATE TABLE IF NOT EXISTS attachments (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id      INTEGER NOT NULL REFERENCES content_units(id) ON DELETE CASCADE,
    title         TEXT NOT NULL,
    local_url     TEXT NOT NULL,
    remote_url    TEXT NOT NULL,
    local_path    TEXT NOT NULL,
    mime_type     TEXT,
    metadata_json TEXT,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attachments_owner ON attachments(owner_id);

-- Presence of a row means the unit has been processed.
CREATE TABLE IF NOT EXISTS import_markers (
    unit_id      INTEGER PRIMARY KEY,
    processed_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
