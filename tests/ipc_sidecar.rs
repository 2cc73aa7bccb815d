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
    let exe = env!("CARGO_BIN_EXE_edutrackd");
    let mut child = Command::new(exe)
        .arg("stdio")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn edutrackd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
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

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn methods_before_workspace_select_report_no_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["workspacePath"].is_null());

    let resp = request(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(error_code(&resp), "no_workspace");

    let resp = request(&mut stdin, &mut reader, "3", "grades.list", json!({}));
    assert_eq!(error_code(&resp), "not_implemented");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn record_and_summarize_over_stdio() {
    let workspace = temp_dir("edutrack-sidecar");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("edutrack.sqlite3").is_file());

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "name": "Asha", "roll_number": "R001", "department": "CS" }),
    );
    let asha = created["id"].as_i64().expect("student id");
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "name": "Ravi", "roll_number": "R002", "department": "CS" }),
    );

    let dup = request(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "name": "Again", "roll_number": "R001", "department": "CS" }),
    );
    assert_eq!(error_code(&dup), "CONFLICT");

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.record",
        json!({ "student_id": asha, "class_id": "CS101", "status": "present" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.record",
        json!({ "student_id": asha, "class_id": "CS101", "status": "absent" }),
    );
    let missing = request(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.record",
        json!({ "student_id": 999, "class_id": "CS101", "status": "present" }),
    );
    assert_eq!(error_code(&missing), "NOT_FOUND");

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.history",
        json!({ "student_id": asha }),
    );
    assert_eq!(history["records"].as_array().map(Vec::len), Some(2));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.studentSummary",
        json!({ "student_id": asha }),
    );
    assert_eq!(summary["attendance_percentage"].as_f64(), Some(50.0));

    let rows = request_ok(&mut stdin, &mut reader, "10", "analytics.attendanceSummary", json!({}));
    let rolls: Vec<&str> = rows["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .filter_map(|r| r["roll_number"].as_str())
        .collect();
    assert_eq!(rolls, vec!["R002", "R001"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn draft_commit_and_batch_rollback_over_stdio() {
    let workspace = temp_dir("edutrack-sidecar-drafts");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "name": "Asha", "roll_number": "R001", "department": "CS" }),
    );

    let rejected = request(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.submitBatch",
        json!({
            "class_id": "CS101",
            "date": "2024-02-01",
            "entries": [
                { "roll_number": "R001", "status": "present" },
                { "roll_number": "R404", "status": "absent" }
            ]
        }),
    );
    assert_eq!(error_code(&rejected), "PARTIAL_WRITE");
    assert_eq!(rejected["error"]["details"]["failures"][0]["reference"], "R404");

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "drafts.save",
        json!({ "class_id": "CS101", "date": "2024-02-01", "marks": { "R001": "present" } }),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "drafts.get",
        json!({ "class_id": "CS101", "date": "2024-02-01" }),
    );
    assert_eq!(got["draft"]["marks"]["R001"], "present");

    let receipt = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "drafts.commit",
        json!({ "class_id": "CS101", "date": "2024-02-01" }),
    );
    assert_eq!(receipt["record_ids"].as_array().map(Vec::len), Some(1));

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "drafts.get",
        json!({ "class_id": "CS101", "date": "2024-02-01" }),
    );
    assert!(got["draft"].is_null());

    let discarded = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "drafts.discard",
        json!({ "class_id": "CS101", "date": "2024-02-01" }),
    );
    assert_eq!(discarded["discarded"], false);

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.history",
        json!({ "student_id": 1 }),
    );
    assert_eq!(history["records"].as_array().map(Vec::len), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn appeals_and_notifications_over_stdio() {
    let workspace = temp_dir("edutrack-sidecar-appeals");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "1", "appeals.list", json!({}));
    assert_eq!(error_code(&resp), "no_workspace");

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "3", "appeals.list", json!({}));
    assert_eq!(listed["appeals"].as_array().map(Vec::len), Some(0));

    let missing = request(&mut stdin, &mut reader, "4", "appeals.approve", json!({ "id": 7 }));
    assert_eq!(error_code(&missing), "NOT_FOUND");

    let nobody = request(
        &mut stdin,
        &mut reader,
        "5",
        "notifications.send",
        json!({ "user_id": 1, "title": "Low attendance", "message": "Below 75%" }),
    );
    assert_eq!(error_code(&nobody), "NOT_FOUND");
    let blank = request(
        &mut stdin,
        &mut reader,
        "6",
        "notifications.send",
        json!({ "user_id": 1, "title": "", "message": "" }),
    );
    assert_eq!(error_code(&blank), "VALIDATION");

    let inbox = request_ok(&mut stdin, &mut reader, "7", "notifications.list", json!({ "user_id": 1 }));
    assert_eq!(inbox["notifications"].as_array().map(Vec::len), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}
