//! SQL migration definitions for the heirdesk registry database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: entities",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Entity registry, one row per bank. `position` keeps seed order.
CREATE TABLE IF NOT EXISTS entities (
    name         TEXT PRIMARY KEY,
    position     INTEGER NOT NULL,
    source_url   TEXT,
    fields_json  TEXT NOT NULL,
    summary      TEXT NOT NULL,
    provenance   TEXT,
    last_updated TEXT NOT NULL DEFAULT '-'
);

CREATE INDEX IF NOT EXISTS idx_entities_position ON entities(position);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
