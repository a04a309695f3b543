use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn strings(entries: &serde_json::Value, key: &str) -> Vec<String> {
    entries
        .as_array()
        .expect("entries array")
        .iter()
        .map(|e| e.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string())
        .collect()
}

fn totals(entries: &serde_json::Value) -> Vec<f64> {
    entries
        .as_array()
        .expect("entries array")
        .iter()
        .map(|e| e.get("total").and_then(|v| v.as_f64()).expect("total"))
        .collect()
}

#[test]
fn recompute_ranks_persists_and_tracks_staleness() {
    let workspace = temp_dir("resultsd-ranking");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "rosters.create",
        json!({ "subject": "Mathematics", "term": "2026-T1", "className": "JHS 2" }),
    );
    let roster_id = roster
        .get("rosterId")
        .and_then(|v| v.as_str())
        .expect("rosterId")
        .to_string();

    // Display order deliberately differs from rank order.
    let students = [
        (
            "s-weak",
            "Boateng, Yaw",
            json!({ "cat1": 10, "cat2": 20, "projectWork": 9.99, "exams": 0 }),
        ),
        ("s-top", "Mensah, Ama", json!({ "cat1": 8, "cat2": 15, "projectWork": 18, "exams": 90 })),
        ("s-mid", "Owusu, Kofi", json!({ "cat1": 10, "cat2": 20, "projectWork": 10 })),
    ];
    let mut entry_ids = Vec::new();
    for (i, (sid, name, scores)) in students.iter().enumerate() {
        let mut params = scores.clone();
        params["rosterId"] = json!(roster_id);
        params["studentId"] = json!(sid);
        params["studentName"] = json!(name);
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "entries.create",
            params,
        );
        assert_eq!(created["studentId"], json!(sid));
        entry_ids.push(created["entryId"].as_str().expect("entryId").to_string());
    }

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "results.open",
        json!({ "rosterId": roster_id }),
    );
    assert_eq!(before["stale"], json!(true));
    assert!(before["entries"][0]["position"].is_null());
    assert!(before["entries"][0]["remarks"].is_null());

    let ranked = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.recompute",
        json!({ "rosterId": roster_id }),
    );
    let entries = &ranked["entries"];
    assert_eq!(strings(entries, "studentId"), vec!["s-weak", "s-top", "s-mid"]);
    assert_eq!(totals(entries), vec![39.99, 86.0, 40.0]);
    assert_eq!(strings(entries, "position"), vec!["3RD", "1ST", "2ND"]);
    assert_eq!(strings(entries, "remarks"), vec!["WEAK", "GOOD", "AVERAGE"]);
    assert_eq!(ranked["classAverage"].as_f64(), Some(55.33));
    assert!(ranked["computedAt"].is_string());

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "results.open",
        json!({ "rosterId": roster_id }),
    );
    assert_eq!(opened["stale"], json!(false));
    assert_eq!(strings(&opened["entries"], "position"), vec!["3RD", "1ST", "2ND"]);
    assert_eq!(opened["roster"]["subject"], json!("Mathematics"));

    // Recomputing an unchanged roster yields the same derived values.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "results.recompute",
        json!({ "rosterId": roster_id }),
    );
    assert_eq!(totals(&again["entries"]), totals(entries));
    assert_eq!(strings(&again["entries"], "position"), strings(entries, "position"));
    assert_eq!(strings(&again["entries"], "remarks"), strings(entries, "remarks"));

    // A score edit marks the roster stale but leaves the last pass in place.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "entries.update",
        json!({
            "rosterId": roster_id,
            "entryId": entry_ids[0],
            "patch": { "exams": 100 }
        }),
    );
    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "results.open",
        json!({ "rosterId": roster_id }),
    );
    assert_eq!(edited["stale"], json!(true));
    assert_eq!(edited["entries"][0]["exams"].as_f64(), Some(100.0));
    assert_eq!(edited["entries"][0]["position"], json!("3RD"));

    let reranked = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "results.recompute",
        json!({ "rosterId": roster_id }),
    );
    assert_eq!(totals(&reranked["entries"]), vec![89.99, 86.0, 40.0]);
    assert_eq!(strings(&reranked["entries"], "position"), vec!["1ST", "2ND", "3RD"]);

    let listed = request_ok(&mut stdin, &mut reader, "10", "rosters.list", json!({}));
    let rosters = listed["rosters"].as_array().expect("rosters");
    assert_eq!(rosters.len(), 1);
    assert_eq!(rosters[0]["entryCount"], json!(3));
    assert_eq!(rosters[0]["stale"], json!(false));

    // Clearing the roster leaves an empty ranking with no class average.
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "rosters.clear",
        json!({ "rosterId": roster_id }),
    );
    assert_eq!(cleared["removed"], json!(3));
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "results.recompute",
        json!({ "rosterId": roster_id }),
    );
    assert_eq!(empty["entries"], json!([]));
    assert_eq!(empty["classAverage"], json!("N/A"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn preview_ranks_inline_rosters_without_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "results.preview",
        json!({
            "entries": [
                { "id": "a", "name": "A", "cat1": 5, "cat2": 5, "projectWork": 5, "exams": 10 },
                { "id": "b", "name": "B", "cat1": "9", "cat2": 9, "projectWork": 9, "exams": 20 },
                { "id": "c", "name": "C", "cat1": 5, "cat2": 5, "projectWork": 5, "exams": 10 },
                { "id": "d", "name": "D", "cat1": "oops", "exams": null }
            ]
        }),
    );
    let entries = &res["entries"];
    assert_eq!(totals(entries), vec![20.0, 37.0, 20.0, 0.0]);
    // Ties keep roster order and still take distinct positions.
    assert_eq!(strings(entries, "position"), vec!["2ND", "1ST", "3RD", "4TH"]);
    assert_eq!(strings(entries, "remarks"), vec!["WEAK", "WEAK", "WEAK", "WEAK"]);
    assert_eq!(res["classAverage"].as_f64(), Some(19.25));

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.preview",
        json!({ "entries": [] }),
    );
    assert_eq!(empty["entries"], json!([]));
    assert_eq!(empty["classAverage"], json!("N/A"));

    drop(stdin);
    let _ = child.wait();
}
