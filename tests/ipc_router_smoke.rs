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


#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("attendanced-router-smoke");
    let csv_out = workspace.join("smoke-export.csv");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(
        request_err_code(&mut stdin, &mut reader, "2", "lessons.list", json!({})),
        "no_workspace"
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("attendance.sqlite3").is_file());
    assert!(workspace.join("config.json").is_file());

    let health = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    assert_eq!(
        health.get("version").and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("lessons.list", json!({})),
        ("students.list", json!({})),
        ("session.get", json!({ "sessionId": "missing" })),
        ("session.abandon", json!({ "sessionId": "missing" })),
        ("submissions.list", json!({})),
        ("submissions.summary", json!({})),
        (
            "submissions.exportCsv",
            json!({ "outPath": csv_out.to_string_lossy() }),
        ),
        ("import.requirements", json!({ "kind": "students" })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("smoke-{}", i);
        let value = request(&mut stdin, &mut reader, &id, method, params);
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        assert_ne!(code, "not_implemented", "unknown method {}", method);
    }
    assert_eq!(
        std::fs::read_to_string(&csv_out).expect("export written"),
        "Date,Lesson,Day,Period,Student ID,Status\n"
    );

    assert_eq!(
        request_err_code(&mut stdin, &mut reader, "5", "grades.open", json!({})),
        "not_implemented"
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_line_gets_bad_json_and_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("reply is json");
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_json")
    );

    request_ok(&mut stdin, &mut reader, "1", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
}
