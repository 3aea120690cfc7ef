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
    let exe = env!("CARGO_BIN_EXE_sisd");
    let mut child = Command::new(exe)
        .env("SISD_INSTITUTION_DOMAIN", "example.ac.id")
        .env("SISD_CURRENT_SEMESTER", "Fall 2023")
        .env("SISD_PASSWORD_ROUNDS", "1000")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn sisd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_line(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
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

    let value = read_line(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("sisd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert!(health["result"]["workspacePath"].is_null());

    // Everything but health needs a workspace.
    let early = request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.login",
        json!({ "username": "x", "password": "y" }),
    );
    assert_eq!(early["error"]["code"], "no_workspace");

    let selected = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], true);
    assert!(workspace.join("sis.sqlite3").is_file());

    let methods = [
        "setup.get",
        "auth.register",
        "auth.login",
        "auth.logout",
        "dashboard.student",
        "dashboard.instructor",
        "courses.create",
        "courses.schedules.add",
        "enrollments.create",
        "scores.add",
        "courses.students.list",
        "courses.students.updateGrades",
    ];
    for (i, method) in methods.iter().enumerate() {
        let id = format!("m{}", i);
        let _ = request(&mut stdin, &mut reader, &id, method, json!({}));
    }

    let unknown = {
        writeln!(
            stdin,
            "{}",
            json!({ "id": "u1", "method": "nope.nothing", "params": {} })
        )
        .expect("write");
        stdin.flush().expect("flush");
        read_line(&mut reader)
    };
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown["error"]["code"], "not_implemented");
    assert_eq!(unknown["error"]["status"], 501);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{ not json").expect("write garbage");
    stdin.flush().expect("flush");
    let bad = read_line(&mut reader);
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");
    assert_eq!(bad["error"]["status"], 400);

    let health = request(&mut stdin, &mut reader, "after", "health", json!({}));
    assert_eq!(health["ok"], true);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unauthenticated_calls_are_rejected_with_401() {
    let workspace = temp_dir("sisd-router-auth");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (i, method) in ["dashboard.student", "dashboard.instructor", "auth.logout"]
        .iter()
        .enumerate()
    {
        let missing = request(&mut stdin, &mut reader, &format!("a{i}"), method, json!({}));
        assert_eq!(missing["error"]["code"], "unauthorized");
        assert_eq!(missing["error"]["status"], 401);

        let bogus = request(
            &mut stdin,
            &mut reader,
            &format!("b{i}"),
            method,
            json!({ "token": "not-a-token" }),
        );
        assert_eq!(bogus["error"]["code"], "unauthorized");
    }

    drop(stdin);
    let _ = child.wait();
}
