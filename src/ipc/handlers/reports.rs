use crate::grading::{class_average, class_average_json, ScoreEntry};
use crate::ipc::helpers::{require_db, required_str, store_err};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

/// Term report card for one student: each subject's stored result plus the
/// mean of the subject totals.
fn handle_reports_student_results(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let term = match required_str(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let subjects = match store::student_results(conn, &student_id, &term) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, e),
    };
    let scores: Vec<ScoreEntry> = subjects.iter().map(|s| s.score.clone()).collect();
    let student_name = scores
        .first()
        .map(|s| s.student_name.clone())
        .unwrap_or_default();

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "studentName": student_name,
            "term": term,
            "subjects": subjects,
            "average": class_average_json(class_average(&scores)),
            "anyStale": subjects.iter().any(|s| s.stale),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentResults" => Some(handle_reports_student_results(state, req)),
        _ => None,
    }
}
