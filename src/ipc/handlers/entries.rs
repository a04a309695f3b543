use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    optional_str, parse_component_scores, require_db, required_str, store_err,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, EntryPatch, NewEntry};
use serde_json::json;

fn handle_entries_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store::list_entries(conn, &roster_id) {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_entries_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_name = match required_str(req, "studentName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match optional_str(&req.id, &req.params, "studentId") {
        Ok(v) => v.filter(|s| !s.is_empty()),
        Err(resp) => return resp,
    };
    let scores = match parse_component_scores(&req.id, &req.params) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let new = NewEntry {
        student_id,
        student_name,
        scores,
    };
    match store::create_entry(conn, &roster_id, &new) {
        Ok((entry_id, student_id)) => ok(
            &req.id,
            json!({ "entryId": entry_id, "studentId": student_id }),
        ),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_entries_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let entry_id = match required_str(req, "entryId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(patch_raw) = req.params.get("patch").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let student_name = match optional_str(&req.id, patch_raw, "studentName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if student_name.as_deref() == Some("") {
        return err(&req.id, "bad_params", "studentName must not be empty", None);
    }
    // Blank or null remarks clear the manual remark.
    let remarks = if patch_raw.get("remarks").is_some() {
        match optional_str(&req.id, patch_raw, "remarks") {
            Ok(v) => Some(v.filter(|s| !s.is_empty())),
            Err(resp) => return resp,
        }
    } else {
        None
    };
    let scores = match parse_component_scores(&req.id, patch_raw) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let patch = EntryPatch {
        student_name,
        remarks,
        scores,
    };
    match store::update_entry(conn, &roster_id, &entry_id, &patch) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_entries_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let entry_id = match required_str(req, "entryId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store::delete_entry(conn, &roster_id, &entry_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_entries_reorder(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw_ids) = req.params.get("orderedEntryIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing orderedEntryIds", None);
    };
    let mut ordered: Vec<String> = Vec::with_capacity(raw_ids.len());
    for v in raw_ids {
        let Some(s) = v.as_str() else {
            return err(
                &req.id,
                "bad_params",
                "orderedEntryIds must be strings",
                Some(json!({ "value": v })),
            );
        };
        ordered.push(s.to_string());
    }
    match store::reorder_entries(conn, &roster_id, &ordered) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "entries.list" => Some(handle_entries_list(state, req)),
        "entries.create" => Some(handle_entries_create(state, req)),
        "entries.update" => Some(handle_entries_update(state, req)),
        "entries.delete" => Some(handle_entries_delete(state, req)),
        "entries.reorder" => Some(handle_entries_reorder(state, req)),
        _ => None,
    }
}
