use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, require_db, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, RosterPatch};
use serde_json::json;

fn handle_rosters_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "rosters": [] }));
    };
    match store::list_rosters(conn) {
        Ok(rosters) => ok(&req.id, json!({ "rosters": rosters })),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_rosters_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let term = match required_str(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let class_name = match optional_str(&req.id, &req.params, "className") {
        Ok(v) => v.unwrap_or_default(),
        Err(resp) => return resp,
    };

    match store::create_roster(conn, &subject, &term, &class_name) {
        Ok(roster_id) => {
            tracing::info!(%roster_id, %subject, %term, "roster created");
            ok(&req.id, json!({ "rosterId": roster_id }))
        }
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_rosters_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut patch = RosterPatch::default();
    for (key, slot) in [
        ("subject", &mut patch.subject),
        ("term", &mut patch.term),
        ("className", &mut patch.class_name),
    ] {
        match optional_str(&req.id, &req.params, key) {
            Ok(v) => *slot = v,
            Err(resp) => return resp,
        }
    }
    for (key, value) in [("subject", &patch.subject), ("term", &patch.term)] {
        if value.as_deref() == Some("") {
            return err(
                &req.id,
                "bad_params",
                format!("{} must not be empty", key),
                None,
            );
        }
    }

    match store::update_roster(conn, &roster_id, &patch) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_rosters_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store::delete_roster(conn, &roster_id) {
        Ok(()) => {
            tracing::info!(%roster_id, "roster deleted");
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_rosters_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let roster_id = match required_str(req, "rosterId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store::clear_roster(conn, &roster_id) {
        Ok(removed) => ok(&req.id, json!({ "removed": removed })),
        Err(e) => store_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rosters.list" => Some(handle_rosters_list(state, req)),
        "rosters.create" => Some(handle_rosters_create(state, req)),
        "rosters.update" => Some(handle_rosters_update(state, req)),
        "rosters.delete" => Some(handle_rosters_delete(state, req)),
        "rosters.clear" => Some(handle_rosters_clear(state, req)),
        _ => None,
    }
}
