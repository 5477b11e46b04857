//! Database schema for the `SQLite` destination.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the destination database.
pub const SCHEMA_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        lead TEXT,
        description TEXT,
        url TEXT,
        assignee_type TEXT,
        email_sender TEXT,
        counter INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        name TEXT NOT NULL,
        description TEXT,
        sequence INTEGER NOT NULL DEFAULT 0,
        released INTEGER NOT NULL DEFAULT 0,
        archived INTEGER NOT NULL DEFAULT 0,
        release_date TEXT,
        UNIQUE(project_id, name)
    );

    CREATE TABLE IF NOT EXISTS components (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        name TEXT NOT NULL,
        description TEXT,
        lead TEXT,
        assignee_type TEXT,
        UNIQUE(project_id, name)
    );

    -- Issues keep the key they had in the export.
    CREATE TABLE IF NOT EXISTS issues (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        key TEXT NOT NULL UNIQUE,
        issue_type_id TEXT NOT NULL,
        status_id TEXT,
        priority_id TEXT,
        resolution_id TEXT,
        security_level_id TEXT,
        reporter TEXT,
        assignee TEXT,
        creator TEXT,
        summary TEXT NOT NULL DEFAULT '',
        description TEXT,
        environment TEXT,
        created TEXT,
        updated TEXT,
        due_date TEXT,
        resolution_date TEXT,
        votes INTEGER,
        watches INTEGER,
        original_estimate INTEGER,
        remaining_estimate INTEGER,
        time_spent INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_id);

    -- Issue-dependent entities (comments, worklogs, links, values, ...).
    CREATE TABLE IF NOT EXISTS entities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        fields TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind);

    CREATE TABLE IF NOT EXISTS users (
        key TEXT PRIMARY KEY,
        full_name TEXT,
        email TEXT
    );

    CREATE TABLE IF NOT EXISTS user_groups (
        name TEXT PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS role_members (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        role_id TEXT NOT NULL,
        actor_type TEXT NOT NULL,
        actor TEXT NOT NULL,
        UNIQUE(project_id, role_id, actor_type, actor)
    );

    CREATE TABLE IF NOT EXISTS attachments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id INTEGER NOT NULL REFERENCES issues(id),
        file_name TEXT NOT NULL,
        mime_type TEXT,
        file_size INTEGER,
        author TEXT,
        created TEXT,
        source_path TEXT NOT NULL
    );

    -- Reference data matched by name during auto-mapping.
    CREATE TABLE IF NOT EXISTS reference_values (
        kind TEXT NOT NULL,
        id TEXT NOT NULL,
        name TEXT NOT NULL,
        project_id TEXT,
        PRIMARY KEY (kind, id)
    );

    CREATE TABLE IF NOT EXISTS workflow_statuses (
        issue_type_id TEXT NOT NULL,
        status_id TEXT NOT NULL,
        PRIMARY KEY (issue_type_id, status_id)
    );

    CREATE TABLE IF NOT EXISTS custom_fields (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        type_key TEXT NOT NULL,
        project_ids TEXT,
        issue_type_ids TEXT
    );

    CREATE TABLE IF NOT EXISTS custom_field_options (
        id TEXT PRIMARY KEY,
        field_id TEXT NOT NULL REFERENCES custom_fields(id),
        parent_id TEXT,
        value TEXT NOT NULL
    );

    -- Write side effects.
    CREATE TABLE IF NOT EXISTS index_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_kind TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        queued_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_kind TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS reindex_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        requested_at TEXT NOT NULL
    );
";

/// Apply the schema and connection pragmas.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set journal mode to WAL for concurrency
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.pragma_update(None, "foreign_keys", "ON")?;

    // NORMAL synchronous is safe with WAL
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_applies_twice() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }
}
