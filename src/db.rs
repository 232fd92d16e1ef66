use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "seriesd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Same schema as `open_db`, for tests and throwaway sessions.
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fullname TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS contexts(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL UNIQUE,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS capability_grants(
            context_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            capability TEXT NOT NULL,
            PRIMARY KEY(context_id, user_id, capability),
            FOREIGN KEY(context_id) REFERENCES contexts(id)
        )",
        [],
    )?;

    // Local stand-in for the media service's series store.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS series(
            identifier TEXT NOT NULL,
            instance_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            created_by INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY(instance_id, identifier)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS series_metadata(
            instance_id INTEGER NOT NULL,
            series_id TEXT NOT NULL,
            field TEXT NOT NULL,
            value_json TEXT NOT NULL,
            PRIMARY KEY(instance_id, series_id, field),
            FOREIGN KEY(instance_id, series_id) REFERENCES series(instance_id, identifier)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS series_acl(
            instance_id INTEGER NOT NULL,
            series_id TEXT NOT NULL,
            course_id INTEGER NOT NULL,
            role TEXT NOT NULL,
            action TEXT NOT NULL,
            granted_by INTEGER NOT NULL,
            PRIMARY KEY(instance_id, series_id, course_id, role, action),
            FOREIGN KEY(instance_id, series_id) REFERENCES series(instance_id, identifier)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_series(
            course_id INTEGER NOT NULL,
            instance_id INTEGER NOT NULL,
            series_id TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(course_id, instance_id, series_id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_series_course ON course_series(course_id, instance_id)",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("corrupt setting {key}"))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn create_course(conn: &Connection, fullname: &str) -> anyhow::Result<(i64, i64)> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("INSERT INTO courses(fullname) VALUES(?)", [fullname])?;
    let course_id = tx.last_insert_rowid();
    tx.execute("INSERT INTO contexts(course_id) VALUES(?)", [course_id])?;
    let context_id = tx.last_insert_rowid();
    tx.commit()?;
    Ok((course_id, context_id))
}

pub fn course_for_context(conn: &Connection, context_id: i64) -> anyhow::Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT course_id FROM contexts WHERE id = ?",
            [context_id],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn grant_capability(
    conn: &Connection,
    context_id: i64,
    user_id: i64,
    capability: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO capability_grants(context_id, user_id, capability) VALUES(?, ?, ?)",
        (context_id, user_id, capability),
    )?;
    Ok(())
}

pub fn revoke_capability(
    conn: &Connection,
    context_id: i64,
    user_id: i64,
    capability: &str,
) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM capability_grants WHERE context_id = ? AND user_id = ? AND capability = ?",
        (context_id, user_id, capability),
    )?;
    Ok(n > 0)
}

pub fn has_capability(
    conn: &Connection,
    context_id: i64,
    user_id: i64,
    capability: &str,
) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM capability_grants WHERE context_id = ? AND user_id = ? AND capability = ?",
            (context_id, user_id, capability),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Persisted course selection, ordered the way rows were linked.
pub fn course_series_list(
    conn: &Connection,
    course_id: i64,
    instance_id: i64,
) -> anyhow::Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT series_id, is_default FROM course_series
         WHERE course_id = ? AND instance_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map((course_id, instance_id), |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replace the course selection with `selection` (identifier, default flag).
pub fn course_series_replace(
    conn: &Connection,
    course_id: i64,
    instance_id: i64,
    selection: &[(String, i64)],
) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM course_series WHERE course_id = ? AND instance_id = ?",
        (course_id, instance_id),
    )?;
    for (series_id, is_default) in selection {
        tx.execute(
            "INSERT INTO course_series(course_id, instance_id, series_id, is_default)
             VALUES(?, ?, ?, ?)",
            (course_id, instance_id, series_id, is_default),
        )?;
    }
    tx.commit()?;
    Ok(())
}
