#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_tardymarkd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn tardymarkd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
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

pub fn request_ok(
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
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

pub fn str_field(value: &serde_json::Value, ptr: &str) -> String {
    value
        .pointer(ptr)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", ptr, value))
        .to_string()
}

/// Ids created by [`seed_campus`].
pub struct Campus {
    pub cse: String,
    pub ece: String,
    pub cse_a: String,
    pub ece_a: String,
    /// Asha (F, CSE II-A, mentor Dr. Iyer, has a parent phone).
    pub asha: String,
    /// Ravi (M, CSE II-A, mentor Dr. Iyer).
    pub ravi: String,
    /// Meena (F, ECE II, mentor Ms. Nair).
    pub meena: String,
}

pub fn seed_campus(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Campus {
    let cse = request_ok(stdin, reader, "seed-d1", "departments.create", json!({ "name": "CSE" }));
    let cse = str_field(&cse, "/department/id");
    let ece = request_ok(stdin, reader, "seed-d2", "departments.create", json!({ "name": "ECE" }));
    let ece = str_field(&ece, "/department/id");

    let cse_a = request_ok(
        stdin,
        reader,
        "seed-c1",
        "classes.create",
        json!({ "departmentId": cse, "name": "II-A" }),
    );
    let cse_a = str_field(&cse_a, "/class/id");
    let ece_a = request_ok(
        stdin,
        reader,
        "seed-c2",
        "classes.create",
        json!({ "departmentId": ece, "name": "II" }),
    );
    let ece_a = str_field(&ece_a, "/class/id");

    let asha = request_ok(
        stdin,
        reader,
        "seed-s1",
        "students.create",
        json!({
            "name": "Asha Rao",
            "departmentId": cse,
            "classId": cse_a,
            "registerNo": "21CS001",
            "gender": "FEMALE",
            "parentPhoneNumber": "9876543210",
            "mentor": "Dr. Iyer"
        }),
    );
    let asha = str_field(&asha, "/student/id");
    let ravi = request_ok(
        stdin,
        reader,
        "seed-s2",
        "students.create",
        json!({
            "name": "Ravi Kumar",
            "departmentId": cse,
            "classId": cse_a,
            "registerNo": "21CS002",
            "gender": "MALE",
            "mentor": "Dr. Iyer"
        }),
    );
    let ravi = str_field(&ravi, "/student/id");
    let meena = request_ok(
        stdin,
        reader,
        "seed-s3",
        "students.create",
        json!({
            "name": "Meena S",
            "departmentId": ece,
            "classId": ece_a,
            "registerNo": "21EC001",
            "gender": "FEMALE",
            "mentor": "Ms. Nair"
        }),
    );
    let meena = str_field(&meena, "/student/id");

    Campus {
        cse,
        ece,
        cse_a,
        ece_a,
        asha,
        ravi,
        meena,
    }
}

pub fn mark_late(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: &str,
    status: &str,
    timestamp: &str,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        id,
        "records.create",
        json!({
            "studentId": student_id,
            "status": status,
            "markedBy": "Admin Staff",
            "timestamp": timestamp
        }),
    )
}
