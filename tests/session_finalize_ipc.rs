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
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
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
    value.get("result").cloned().unwrap_or(json!({}))
}

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}


fn open_workspace_with_math(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "lesson",
        "lessons.upsert",
        json!({
            "lesson": {
                "name": "Math",
                "weekday": "Mon",
                "period": "1-2",
                "beginDate": "2025-04-01",
                "endDate": "2025-07-31"
            }
        }),
    );
    for id in ["S1", "S2", "S3"] {
        request_ok(
            stdin,
            reader,
            &format!("add-{}", id),
            "students.add",
            json!({ "studentId": id }),
        );
    }
}

#[test]
fn finalize_writes_one_record_per_roster_student() {
    let workspace = temp_dir("attendanced-session-finalize");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_math(&mut stdin, &mut reader, &workspace);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "session.open",
        json!({ "lessonName": "Math", "date": "2025-04-29" }),
    );
    let session_id = opened
        .get("sessionId")
        .and_then(|v| v.as_str())
        .expect("sessionId")
        .to_string();
    assert_eq!(opened.get("state").and_then(|v| v.as_str()), Some("open"));
    assert_eq!(
        opened.get("outsideLessonWindow").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(
        opened.get("roster").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(3)
    );

    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "2",
            "session.markPresent",
            json!({ "sessionId": session_id, "studentIds": [] }),
        ),
        "validation_failed"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "3",
            "session.markPresent",
            json!({ "sessionId": session_id, "studentIds": ["S1", "S9"] }),
        ),
        "validation_failed"
    );

    let marked = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.markPresent",
        json!({ "sessionId": session_id, "studentIds": ["S1"] }),
    );
    assert_eq!(marked.get("newlyMarked").and_then(|v| v.as_u64()), Some(1));
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "session.markPresent",
        json!({ "sessionId": session_id, "studentIds": ["S1"] }),
    );
    assert_eq!(again.get("newlyMarked").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(again.get("presentCount").and_then(|v| v.as_u64()), Some(1));

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "session.get",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(
        got.get("roster"),
        Some(&json!([
            { "studentId": "S1", "present": true },
            { "studentId": "S2", "present": false },
            { "studentId": "S3", "present": false }
        ]))
    );

    let finalized = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "session.finalize",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(finalized.get("recordCount").and_then(|v| v.as_u64()), Some(3));

    // Finalized sessions are released.
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "8",
            "session.get",
            json!({ "sessionId": session_id }),
        ),
        "not_found"
    );

    let listed = request_ok(&mut stdin, &mut reader, "9", "submissions.list", json!({}));
    let expected = json!([
        { "date": "2025-04-29", "lesson": "Math", "weekday": "Mon", "period": "1-2", "studentId": "S1", "status": "Present" },
        { "date": "2025-04-29", "lesson": "Math", "weekday": "Mon", "period": "1-2", "studentId": "S2", "status": "Absent" },
        { "date": "2025-04-29", "lesson": "Math", "weekday": "Mon", "period": "1-2", "studentId": "S3", "status": "Absent" }
    ]);
    assert_eq!(listed.get("records"), Some(&expected));

    let summary = request_ok(&mut stdin, &mut reader, "10", "submissions.summary", json!({}));
    assert_eq!(
        summary.pointer("/sessions/0/absentStudentIds"),
        Some(&json!(["S2", "S3"]))
    );
    assert_eq!(
        summary.pointer("/sessions/0/fullPresence").and_then(|v| v.as_bool()),
        Some(false)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn session_open_rejects_unknown_lesson_and_abandon_writes_nothing() {
    let workspace = temp_dir("attendanced-session-abandon");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_math(&mut stdin, &mut reader, &workspace);

    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "1",
            "session.open",
            json!({ "lessonName": "History", "date": "2025-04-29" }),
        ),
        "not_found"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "2",
            "session.open",
            json!({ "lessonName": "Math", "date": "29/04/2025" }),
        ),
        "validation_failed"
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.open",
        json!({ "lessonName": "Math", "date": "2025-09-01" }),
    );
    assert_eq!(
        opened.get("outsideLessonWindow").and_then(|v| v.as_bool()),
        Some(true)
    );
    let session_id = opened
        .get("sessionId")
        .and_then(|v| v.as_str())
        .expect("sessionId")
        .to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.markPresent",
        json!({ "sessionId": session_id, "studentIds": ["S2"] }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "session.abandon",
        json!({ "sessionId": session_id }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "6", "submissions.list", json!({}));
    assert_eq!(listed.get("records"), Some(&json!([])));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
