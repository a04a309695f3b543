use crate::config;
use crate::export::{self, ExportColumn};
use crate::grading::{
    class_average, class_average_json, coerce_score, rank_roster, Component, ScoreEntry,
};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_db, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, StoredEntry};
use serde_json::json;
use std::path::PathBuf;

fn text_field(obj: &serde_json::Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// Builds a score entry from a loosely-typed record. Scores that are absent
/// or not numeric are left unset and count as 0.
fn entry_from_record(obj: &serde_json::Value) -> ScoreEntry {
    let mut e = ScoreEntry::new(
        text_field(obj, &["studentId", "id"]),
        text_field(obj, &["studentName", "name"]),
    );
    for c in Component::ALL {
        e.set_component(c, coerce_score(obj.get(c.key())));
    }
    e
}

fn handle_results_preview(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "entries must be an array", None);
    };
    let mut entries = Vec::with_capacity(raw.len());
    for (i, item) in raw.iter().enumerate() {
        if !item.is_object() {
            return err(
                &req.id,
                "bad_params",
                "each entry must be an object",
                Some(json!({ "index": i })),
            );
        }
        entries.push(entry_from_record(item));
    }

    let ranked = rank_roster(&entries);
    let avg = class_average(&ranked);
    ok(
        &req.id,
        json!({
            "entries": ranked,
            "classAverage": class_average_json(avg),
        }),
    )
}

fn rank_stored(stored: Vec<StoredEntry>) -> Vec<StoredEntry> {
    let scores: Vec<ScoreEntry> = stored.iter().map(|e| e.score.clone()).collect();
    stored
        .into_iter()
        .zip(rank_roster(&scores))
        .map(|(e, score)| StoredEntry { score, ..e })
        .collect()
}

fn scores_of(entries: &[StoredEntry]) -> Vec<ScoreEntry> {
    entries.iter().map(|e| e.score.clone()).collect()
}

fn handle_results_recompute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let stored = match store::list_entries(conn, &roster_id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, e),
    };
    let ranked = rank_stored(stored);
    let computed_at = match store::save_ranked(conn, &roster_id, &ranked) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, e),
    };
    let avg = class_average(&scores_of(&ranked));
    tracing::info!(
        %roster_id,
        entries = ranked.len(),
        class_average = ?avg,
        "results recomputed"
    );

    ok(
        &req.id,
        json!({
            "entries": ranked,
            "classAverage": class_average_json(avg),
            "computedAt": computed_at,
        }),
    )
}

fn handle_results_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let roster = match store::get_roster(conn, &roster_id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, e),
    };
    let entries = match store::list_entries(conn, &roster_id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, e),
    };
    let avg = class_average(&scores_of(&entries));
    let stale = roster.stale;

    ok(
        &req.id,
        json!({
            "roster": roster,
            "entries": entries,
            "classAverage": class_average_json(avg),
            "stale": stale,
        }),
    )
}

fn parse_columns(req: &Request) -> Result<Vec<ExportColumn>, serde_json::Value> {
    let raw = match req.params.get("columns") {
        None | Some(serde_json::Value::Null) => return Ok(ExportColumn::all()),
        Some(v) => v,
    };
    let Some(items) = raw.as_array() else {
        return Err(err(&req.id, "bad_params", "columns must be an array", None));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str().and_then(ExportColumn::parse) {
            Some(c) => out.push(c),
            None => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "unknown export column",
                    Some(json!({ "column": item })),
                ))
            }
        }
    }
    if out.is_empty() {
        return Err(err(&req.id, "bad_params", "columns must not be empty", None));
    }
    Ok(out)
}

fn handle_results_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let columns = match parse_columns(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let roster = match store::get_roster(conn, &roster_id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, e),
    };
    let entries = match store::list_entries(conn, &roster_id) {
        Ok(v) => scores_of(&v),
        Err(e) => return store_err(&req.id, e),
    };
    let setup = match config::load_results_setup(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let csv = export::render_results_csv(&entries, &columns, &setup, class_average(&entries));
    let out = PathBuf::from(&out_path);
    if let Err(e) = export::write_export(&out, &csv) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }
    tracing::info!(%roster_id, path = %out_path, rows = entries.len(), "results exported");

    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "rowsExported": entries.len(),
            "stale": roster.stale,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.preview" => Some(handle_results_preview(state, req)),
        "results.recompute" => Some(handle_results_recompute(state, req)),
        "results.open" => Some(handle_results_open(state, req)),
        "results.exportCsv" => Some(handle_results_export_csv(state, req)),
        _ => None,
    }
}
