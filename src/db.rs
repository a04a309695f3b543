use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "results.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rosters(
            id TEXT PRIMARY KEY,
            subject TEXT NOT NULL,
            term TEXT NOT NULL,
            class_name TEXT NOT NULL DEFAULT '',
            sort_order INTEGER NOT NULL,
            created_at TEXT,
            UNIQUE(subject, term, class_name)
        )",
        [],
    )?;
    // Workspaces created before results tracking have no staleness columns.
    ensure_rosters_results_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rosters_term ON rosters(term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roster_entries(
            id TEXT PRIMARY KEY,
            roster_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            cat1 REAL,
            cat2 REAL,
            project_work REAL,
            exams REAL,
            total REAL,
            position TEXT,
            remarks TEXT,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(roster_id) REFERENCES rosters(id),
            UNIQUE(roster_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_roster_entries_roster_sort
         ON roster_entries(roster_id, sort_order)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_roster_entries_student ON roster_entries(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_rosters_results_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "rosters", "results_stale")? {
        conn.execute(
            "ALTER TABLE rosters ADD COLUMN results_stale INTEGER NOT NULL DEFAULT 1",
            [],
        )?;
    }
    if !table_has_column(conn, "rosters", "results_computed_at")? {
        conn.execute("ALTER TABLE rosters ADD COLUMN results_computed_at TEXT", [])?;
    }
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
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
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
