use crate::config::{self, SetupSection, UpdateError};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn parse_section(req: &Request) -> Result<SetupSection, serde_json::Value> {
    let name = required_str(req, "section")?;
    SetupSection::parse(&name).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "unknown setup section",
            Some(json!({ "section": name })),
        )
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let section = match parse_section(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    // Without a workspace the defaults are still useful to the settings screen.
    let values = match state.db.as_ref() {
        Some(conn) => match config::section_values(conn, section) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        None => config::default_section(section),
    };
    ok(&req.id, json!({ "section": section.name(), "values": values }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let section = match parse_section(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    match config::update_section(conn, section, patch) {
        Ok(values) => {
            tracing::info!(section = section.name(), "setup updated");
            ok(&req.id, json!({ "section": section.name(), "values": values }))
        }
        Err(UpdateError::Invalid(message)) => err(&req.id, "bad_params", message, None),
        Err(UpdateError::Storage(e)) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
