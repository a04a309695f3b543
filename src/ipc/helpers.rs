use crate::grading::{coerce_score, Component};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::store::StoreError;
use rusqlite::Connection;
use serde_json::json;

pub fn require_db<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Required non-empty string param, trimmed.
pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        )),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

/// Optional string param; present-but-not-a-string is an error.
pub fn optional_str(
    req_id: &str,
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, serde_json::Value> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) => Ok(Some(s.trim().to_string())),
            None => Err(err(
                req_id,
                "bad_params",
                format!("{} must be a string", key),
                None,
            )),
        },
    }
}

pub fn store_err(id: &str, e: StoreError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), None)
}

/// Reads and validates the component scores present in `params`.
///
/// Only keys that appear are returned; `null` clears a score. Values must be
/// numeric (or numeric text) within `[0, max]`.
pub fn parse_component_scores(
    req_id: &str,
    params: &serde_json::Value,
) -> Result<Vec<(Component, Option<f64>)>, serde_json::Value> {
    let mut out = Vec::new();
    for c in Component::ALL {
        let Some(raw) = params.get(c.key()) else {
            continue;
        };
        if raw.is_null() {
            out.push((c, None));
            continue;
        }
        let Some(v) = coerce_score(Some(raw)) else {
            return Err(err(
                req_id,
                "bad_params",
                format!("{} must be a number", c.key()),
                Some(json!({ "field": c.key(), "value": raw })),
            ));
        };
        if v < 0.0 || v > c.max() {
            return Err(err(
                req_id,
                "bad_params",
                format!("{} must be between 0 and {}", c.key(), c.max()),
                Some(json!({ "field": c.key(), "value": v, "max": c.max() })),
            ));
        }
        out.push((c, Some(v)));
    }
    Ok(out)
}
