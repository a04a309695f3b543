use crate::grading::{Component, ScoreEntry};
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl StoreError {
    /// IPC error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Invalid(_) => "bad_params",
            Self::Db(_) => "db_query_failed",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSummary {
    pub id: String,
    pub subject: String,
    pub term: String,
    pub class_name: String,
    pub entry_count: i64,
    pub stale: bool,
    pub computed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    pub entry_id: String,
    pub sort_order: i64,
    #[serde(flatten)]
    pub score: ScoreEntry,
}

#[derive(Debug, Clone, Default)]
pub struct RosterPatch {
    pub subject: Option<String>,
    pub term: Option<String>,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub student_id: Option<String>,
    pub student_name: String,
    pub scores: Vec<(Component, Option<f64>)>,
}

/// Field edits for one entry. `remarks: Some(None)` clears a manual remark.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub student_name: Option<String>,
    pub remarks: Option<Option<String>>,
    pub scores: Vec<(Component, Option<f64>)>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.student_name.is_none() && self.remarks.is_none() && self.scores.is_empty()
    }
}

/// One subject line of a student's term report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub roster_id: String,
    pub subject: String,
    pub class_name: String,
    pub stale: bool,
    #[serde(flatten)]
    pub score: ScoreEntry,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

const ROSTER_SUMMARY_SQL: &str = "SELECT
       r.id,
       r.subject,
       r.term,
       r.class_name,
       (SELECT COUNT(*) FROM roster_entries e WHERE e.roster_id = r.id) AS entry_count,
       r.results_stale,
       r.results_computed_at
     FROM rosters r";

fn roster_from_row(r: &Row<'_>) -> rusqlite::Result<RosterSummary> {
    Ok(RosterSummary {
        id: r.get(0)?,
        subject: r.get(1)?,
        term: r.get(2)?,
        class_name: r.get(3)?,
        entry_count: r.get(4)?,
        stale: r.get::<_, i64>(5)? != 0,
        computed_at: r.get(6)?,
    })
}

const ENTRY_SQL: &str = "SELECT
       id, student_id, student_name, cat1, cat2, project_work, exams,
       total, position, remarks, sort_order
     FROM roster_entries";

fn entry_from_row(r: &Row<'_>) -> rusqlite::Result<StoredEntry> {
    Ok(StoredEntry {
        entry_id: r.get(0)?,
        sort_order: r.get(10)?,
        score: ScoreEntry {
            student_id: r.get(1)?,
            student_name: r.get(2)?,
            cat1: r.get(3)?,
            cat2: r.get(4)?,
            project_work: r.get(5)?,
            exams: r.get(6)?,
            total: r.get(7)?,
            position: r.get(8)?,
            remarks: r.get(9)?,
        },
    })
}

pub fn list_rosters(conn: &Connection) -> StoreResult<Vec<RosterSummary>> {
    let sql = format!("{} ORDER BY r.sort_order", ROSTER_SUMMARY_SQL);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], roster_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_roster(conn: &Connection, roster_id: &str) -> StoreResult<RosterSummary> {
    let sql = format!("{} WHERE r.id = ?", ROSTER_SUMMARY_SQL);
    conn.query_row(&sql, [roster_id], roster_from_row)
        .optional()?
        .ok_or(StoreError::NotFound("roster"))
}

fn ensure_roster_unique(
    conn: &Connection,
    subject: &str,
    term: &str,
    class_name: &str,
    except_id: Option<&str>,
) -> StoreResult<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM rosters WHERE subject = ? AND term = ? AND class_name = ?",
            (subject, term, class_name),
            |r| r.get(0),
        )
        .optional()?;
    match existing {
        Some(id) if Some(id.as_str()) != except_id => Err(StoreError::Conflict(format!(
            "a roster for {} / {} / {} already exists",
            subject, term, class_name
        ))),
        _ => Ok(()),
    }
}

pub fn create_roster(
    conn: &Connection,
    subject: &str,
    term: &str,
    class_name: &str,
) -> StoreResult<String> {
    ensure_roster_unique(conn, subject, term, class_name, None)?;
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM rosters",
        [],
        |r| r.get(0),
    )?;
    let roster_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO rosters(id, subject, term, class_name, sort_order, created_at, results_stale)
         VALUES(?, ?, ?, ?, ?, ?, 1)",
        (&roster_id, subject, term, class_name, sort_order, now_rfc3339()),
    )?;
    Ok(roster_id)
}

pub fn update_roster(conn: &Connection, roster_id: &str, patch: &RosterPatch) -> StoreResult<()> {
    let current = get_roster(conn, roster_id)?;
    let subject = patch.subject.as_deref().unwrap_or(&current.subject);
    let term = patch.term.as_deref().unwrap_or(&current.term);
    let class_name = patch.class_name.as_deref().unwrap_or(&current.class_name);
    ensure_roster_unique(conn, subject, term, class_name, Some(roster_id))?;
    conn.execute(
        "UPDATE rosters SET subject = ?, term = ?, class_name = ? WHERE id = ?",
        (subject, term, class_name, roster_id),
    )?;
    Ok(())
}

pub fn delete_roster(conn: &Connection, roster_id: &str) -> StoreResult<()> {
    get_roster(conn, roster_id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM roster_entries WHERE roster_id = ?", [roster_id])?;
    tx.execute("DELETE FROM rosters WHERE id = ?", [roster_id])?;
    tx.commit()?;
    Ok(())
}

/// Removes every entry of a roster and returns how many were removed.
pub fn clear_roster(conn: &Connection, roster_id: &str) -> StoreResult<usize> {
    get_roster(conn, roster_id)?;
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute("DELETE FROM roster_entries WHERE roster_id = ?", [roster_id])?;
    mark_stale(&tx, roster_id)?;
    tx.commit()?;
    Ok(removed)
}

fn mark_stale(conn: &Connection, roster_id: &str) -> StoreResult<()> {
    conn.execute(
        "UPDATE rosters SET results_stale = 1 WHERE id = ?",
        [roster_id],
    )?;
    Ok(())
}

pub fn list_entries(conn: &Connection, roster_id: &str) -> StoreResult<Vec<StoredEntry>> {
    get_roster(conn, roster_id)?;
    let sql = format!("{} WHERE roster_id = ? ORDER BY sort_order", ENTRY_SQL);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([roster_id], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn student_id_taken(conn: &Connection, roster_id: &str, student_id: &str) -> StoreResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM roster_entries WHERE roster_id = ? AND student_id = ?",
            (roster_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Adds a student to a roster. Returns `(entry_id, student_id)`.
pub fn create_entry(
    conn: &Connection,
    roster_id: &str,
    new: &NewEntry,
) -> StoreResult<(String, String)> {
    get_roster(conn, roster_id)?;
    let student_id = new
        .student_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if student_id_taken(conn, roster_id, &student_id)? {
        return Err(StoreError::Conflict(format!(
            "student {} is already on this roster",
            student_id
        )));
    }

    let mut score = ScoreEntry::new(student_id.clone(), new.student_name.clone());
    for &(c, v) in &new.scores {
        score.set_component(c, v);
    }

    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM roster_entries WHERE roster_id = ?",
        [roster_id],
        |r| r.get(0),
    )?;
    let entry_id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO roster_entries(
           id, roster_id, student_id, student_name,
           cat1, cat2, project_work, exams,
           sort_order, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &entry_id,
            roster_id,
            &student_id,
            &score.student_name,
            score.cat1,
            score.cat2,
            score.project_work,
            score.exams,
            sort_order,
        ),
    )?;
    mark_stale(&tx, roster_id)?;
    tx.commit()?;
    Ok((entry_id, student_id))
}

pub fn update_entry(
    conn: &Connection,
    roster_id: &str,
    entry_id: &str,
    patch: &EntryPatch,
) -> StoreResult<()> {
    if patch.is_empty() {
        return Err(StoreError::Invalid("patch has no editable fields".to_string()));
    }

    let mut sets: Vec<String> = Vec::new();
    let mut bind: Vec<Value> = Vec::new();
    if let Some(name) = &patch.student_name {
        sets.push("student_name = ?".to_string());
        bind.push(Value::Text(name.clone()));
    }
    if let Some(remarks) = &patch.remarks {
        sets.push("remarks = ?".to_string());
        bind.push(remarks.clone().map(Value::Text).unwrap_or(Value::Null));
    }
    for &(c, v) in &patch.scores {
        sets.push(format!("{} = ?", c.column()));
        bind.push(v.map(Value::Real).unwrap_or(Value::Null));
    }
    sets.push("updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')".to_string());
    bind.push(Value::Text(entry_id.to_string()));
    bind.push(Value::Text(roster_id.to_string()));

    let sql = format!(
        "UPDATE roster_entries SET {} WHERE id = ? AND roster_id = ?",
        sets.join(", ")
    );
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(&sql, params_from_iter(bind))?;
    if changed == 0 {
        return Err(StoreError::NotFound("entry"));
    }
    // A manual remark on its own does not invalidate the ranking pass.
    if patch.student_name.is_some() || !patch.scores.is_empty() {
        mark_stale(&tx, roster_id)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn delete_entry(conn: &Connection, roster_id: &str, entry_id: &str) -> StoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute(
        "DELETE FROM roster_entries WHERE id = ? AND roster_id = ?",
        (entry_id, roster_id),
    )?;
    if removed == 0 {
        return Err(StoreError::NotFound("entry"));
    }
    mark_stale(&tx, roster_id)?;
    tx.commit()?;
    Ok(())
}

/// Rewrites display order. `ordered_entry_ids` must name every entry exactly once.
pub fn reorder_entries(
    conn: &Connection,
    roster_id: &str,
    ordered_entry_ids: &[String],
) -> StoreResult<()> {
    let existing: HashSet<String> = list_entries(conn, roster_id)?
        .into_iter()
        .map(|e| e.entry_id)
        .collect();
    let requested: HashSet<&String> = ordered_entry_ids.iter().collect();
    if requested.len() != ordered_entry_ids.len()
        || requested.len() != existing.len()
        || !requested.iter().all(|id| existing.contains(*id))
    {
        return Err(StoreError::Invalid(
            "orderedEntryIds must list every entry of the roster exactly once".to_string(),
        ));
    }

    let tx = conn.unchecked_transaction()?;
    for (i, id) in ordered_entry_ids.iter().enumerate() {
        tx.execute(
            "UPDATE roster_entries SET sort_order = ? WHERE id = ? AND roster_id = ?",
            (i as i64, id, roster_id),
        )?;
    }
    mark_stale(&tx, roster_id)?;
    tx.commit()?;
    Ok(())
}

/// Persists the outcome of a ranking pass and clears the stale flag.
/// Returns the computation timestamp.
pub fn save_ranked(
    conn: &Connection,
    roster_id: &str,
    ranked: &[StoredEntry],
) -> StoreResult<String> {
    let computed_at = now_rfc3339();
    let tx = conn.unchecked_transaction()?;
    for e in ranked {
        tx.execute(
            "UPDATE roster_entries SET total = ?, position = ?, remarks = ?
             WHERE id = ? AND roster_id = ?",
            (
                e.score.total,
                e.score.position.as_deref(),
                e.score.remarks.as_deref(),
                &e.entry_id,
                roster_id,
            ),
        )?;
    }
    tx.execute(
        "UPDATE rosters SET results_stale = 0, results_computed_at = ? WHERE id = ?",
        (&computed_at, roster_id),
    )?;
    tx.commit()?;
    Ok(computed_at)
}

/// Every subject entry for `student_id` among the rosters of `term`.
pub fn student_results(
    conn: &Connection,
    student_id: &str,
    term: &str,
) -> StoreResult<Vec<SubjectResult>> {
    let mut stmt = conn.prepare(
        "SELECT
           r.id, r.subject, r.class_name, r.results_stale,
           e.student_id, e.student_name, e.cat1, e.cat2, e.project_work, e.exams,
           e.total, e.position, e.remarks
         FROM roster_entries e
         JOIN rosters r ON r.id = e.roster_id
         WHERE e.student_id = ? AND r.term = ?
         ORDER BY r.sort_order",
    )?;
    let rows = stmt
        .query_map((student_id, term), |r| {
            Ok(SubjectResult {
                roster_id: r.get(0)?,
                subject: r.get(1)?,
                class_name: r.get(2)?,
                stale: r.get::<_, i64>(3)? != 0,
                score: ScoreEntry {
                    student_id: r.get(4)?,
                    student_name: r.get(5)?,
                    cat1: r.get(6)?,
                    cat2: r.get(7)?,
                    project_work: r.get(8)?,
                    exams: r.get(9)?,
                    total: r.get(10)?,
                    position: r.get(11)?,
                    remarks: r.get(12)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
