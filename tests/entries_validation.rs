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

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request(
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
    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value["ok"], json!(false), "expected failure: {}", value);
    value["error"]["code"].as_str().unwrap_or("")
}

#[test]
fn boundary_rejects_bad_input_and_keeps_roster_consistent() {
    let workspace = temp_dir("resultsd-entries-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let no_ws = request(
        &mut stdin,
        &mut reader,
        "0",
        "rosters.create",
        json!({ "subject": "English", "term": "T1" }),
    );
    assert_eq!(error_code(&no_ws), "no_workspace");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let garbage = read_response(&mut reader);
    assert_eq!(garbage["error"]["code"], json!("bad_json"));

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let roster = request(
        &mut stdin,
        &mut reader,
        "2",
        "rosters.create",
        json!({ "subject": "English", "term": "T1" }),
    );
    let roster_id = roster["result"]["rosterId"].as_str().expect("rosterId").to_string();

    let dup_roster = request(
        &mut stdin,
        &mut reader,
        "3",
        "rosters.create",
        json!({ "subject": "English", "term": "T1" }),
    );
    assert_eq!(error_code(&dup_roster), "conflict");

    let over = request(
        &mut stdin,
        &mut reader,
        "4",
        "entries.create",
        json!({ "rosterId": roster_id, "studentName": "Too High", "cat2": 21 }),
    );
    assert_eq!(error_code(&over), "bad_params");
    assert_eq!(over["error"]["details"]["field"], json!("cat2"));
    assert_eq!(over["error"]["details"]["max"].as_f64(), Some(20.0));

    let negative = request(
        &mut stdin,
        &mut reader,
        "5",
        "entries.create",
        json!({ "rosterId": roster_id, "studentName": "Negative", "exams": -5 }),
    );
    assert_eq!(error_code(&negative), "bad_params");

    let missing_name = request(
        &mut stdin,
        &mut reader,
        "6",
        "entries.create",
        json!({ "rosterId": roster_id, "studentName": "   " }),
    );
    assert_eq!(error_code(&missing_name), "bad_params");

    let created = request(
        &mut stdin,
        &mut reader,
        "7",
        "entries.create",
        json!({ "rosterId": roster_id, "studentId": "ST-1", "studentName": "Adjei, Abena" }),
    );
    assert_eq!(created["ok"], json!(true));
    let entry_id = created["result"]["entryId"].as_str().expect("entryId").to_string();

    let generated = request(
        &mut stdin,
        &mut reader,
        "8",
        "entries.create",
        json!({ "rosterId": roster_id, "studentName": "Appiah, Kojo" }),
    );
    let generated_sid = generated["result"]["studentId"].as_str().expect("studentId");
    assert!(!generated_sid.is_empty());
    assert_ne!(generated_sid, "ST-1");

    let dup_student = request(
        &mut stdin,
        &mut reader,
        "9",
        "entries.create",
        json!({ "rosterId": roster_id, "studentId": "ST-1", "studentName": "Someone Else" }),
    );
    assert_eq!(error_code(&dup_student), "conflict");

    let empty_patch = request(
        &mut stdin,
        &mut reader,
        "10",
        "entries.update",
        json!({ "rosterId": roster_id, "entryId": entry_id, "patch": {} }),
    );
    assert_eq!(error_code(&empty_patch), "bad_params");

    let unknown_entry = request(
        &mut stdin,
        &mut reader,
        "11",
        "entries.update",
        json!({ "rosterId": roster_id, "entryId": "nope", "patch": { "cat1": 3 } }),
    );
    assert_eq!(error_code(&unknown_entry), "not_found");

    let renamed = request(
        &mut stdin,
        &mut reader,
        "12",
        "entries.update",
        json!({
            "rosterId": roster_id,
            "entryId": entry_id,
            "patch": { "studentName": "Adjei, Abena A.", "cat1": "7.5", "remarks": "Hardworking" }
        }),
    );
    assert_eq!(renamed["ok"], json!(true));

    let listed = request(
        &mut stdin,
        &mut reader,
        "13",
        "entries.list",
        json!({ "rosterId": roster_id }),
    );
    let first = &listed["result"]["entries"][0];
    assert_eq!(first["studentName"], json!("Adjei, Abena A."));
    assert_eq!(first["cat1"].as_f64(), Some(7.5));
    assert_eq!(first["remarks"], json!("Hardworking"));
    assert!(first["total"].is_null());

    let bad_reorder = request(
        &mut stdin,
        &mut reader,
        "14",
        "entries.reorder",
        json!({ "rosterId": roster_id, "orderedEntryIds": [entry_id] }),
    );
    assert_eq!(error_code(&bad_reorder), "bad_params");

    let deleted = request(
        &mut stdin,
        &mut reader,
        "15",
        "entries.delete",
        json!({ "rosterId": roster_id, "entryId": entry_id }),
    );
    assert_eq!(deleted["ok"], json!(true));
    let deleted_again = request(
        &mut stdin,
        &mut reader,
        "16",
        "entries.delete",
        json!({ "rosterId": roster_id, "entryId": entry_id }),
    );
    assert_eq!(error_code(&deleted_again), "not_found");

    let unknown = request(&mut stdin, &mut reader, "17", "fees.list", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
