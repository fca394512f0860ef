mod test_support;

use rusqlite::Connection;
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

/// Workspace written before students carried a mentor and records a student id.
fn write_early_workspace() -> std::path::PathBuf {
    let workspace = temp_dir("tardymark-db-migration");
    let conn = Connection::open(workspace.join("tardymark.sqlite3")).expect("open db");
    conn.execute_batch(
        "CREATE TABLE departments(id TEXT PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE classes(id TEXT PRIMARY KEY, department_id TEXT NOT NULL, name TEXT NOT NULL);
         CREATE TABLE students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            register_no TEXT NOT NULL DEFAULT '',
            gender TEXT NOT NULL,
            parent_phone_number TEXT
         );
         CREATE TABLE late_records(
            id TEXT PRIMARY KEY,
            student_name TEXT NOT NULL,
            register_no TEXT NOT NULL DEFAULT '',
            gender TEXT,
            department_name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            date TEXT NOT NULL DEFAULT '',
            time TEXT NOT NULL DEFAULT '',
            timestamp TEXT,
            marked_by TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL
         );
         INSERT INTO departments VALUES('d1', 'MECH');
         INSERT INTO classes VALUES('c1', 'd1', 'III');
         INSERT INTO students VALUES('s1', 'Arun P', 'd1', 'c1', '20ME014', 'MALE', NULL);
         INSERT INTO late_records(id, student_name, register_no, gender, department_name, class_name,
                                  date, time, timestamp, marked_by, status)
           VALUES('r1', 'arun p', '20ME014', NULL, 'MECH', 'III',
                  '04/11/2024', '08:55:00', '2024-11-04T08:55:00.000Z', 'Admin Staff', 'Not Informed');
         INSERT INTO late_records(id, student_name, register_no, gender, department_name, class_name,
                                  date, time, timestamp, marked_by, status)
           VALUES('r2', 'Arun P', '20ME014', NULL, 'MECH', 'III', '', '', NULL, 'Admin Staff', 'Informed');",
    )
    .expect("seed early schema");
    workspace
}

fn has_column(conn: &Connection, table: &str, column: &str) -> bool {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .expect("prepare table_info");
    let names: Vec<String> = stmt
        .query_map([], |r| r.get::<_, String>(1))
        .expect("query table_info")
        .collect::<Result<_, _>>()
        .expect("collect columns");
    names.iter().any(|n| n == column)
}

#[test]
fn early_workspace_gains_columns_and_keeps_records() {
    let workspace = write_early_workspace();
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let conn = Connection::open(workspace.join("tardymark.sqlite3")).expect("reopen db");
    assert!(has_column(&conn, "students", "mentor"));
    assert!(has_column(&conn, "late_records", "student_id"));
    drop(conn);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "records.list",
        json!({ "filters": { "departmentId": "d1" } }),
    );
    assert_eq!(listed.get("totalRows").and_then(|v| v.as_u64()), Some(2));
    let rows = listed.get("rows").and_then(|v| v.as_array()).expect("rows");
    for row in rows {
        assert_eq!(row.get("resolved").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(row.get("lifetimeCount").and_then(|v| v.as_u64()), Some(2));
        assert_eq!(row.get("gender").and_then(|v| v.as_str()), Some("MALE"));
    }

    // The untimed record never lands in a window.
    let windowed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "records.list",
        json!({ "filters": { "dateRange": { "from": "2024-11-04" } } }),
    );
    assert_eq!(windowed.get("totalRows").and_then(|v| v.as_u64()), Some(1));

    let students = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    let first = &students.get("students").and_then(|v| v.as_array()).expect("students")[0];
    assert!(first.get("mentor").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(first.get("lateCount").and_then(|v| v.as_u64()), Some(2));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rows_with_unknown_status_or_gender_are_left_out() {
    let workspace = write_early_workspace();
    let conn = Connection::open(workspace.join("tardymark.sqlite3")).expect("open db");
    conn.execute_batch(
        "INSERT INTO students VALUES('s2', 'Bala K', 'd1', 'c1', '20ME015', 'X', NULL);
         INSERT INTO late_records(id, student_name, register_no, gender, department_name, class_name,
                                  date, time, timestamp, marked_by, status)
           VALUES('r3', 'Arun P', '20ME014', NULL, 'MECH', 'III',
                  '05/11/2024', '09:01:00', '2024-11-05T09:01:00.000Z', 'Admin Staff', 'Absent');",
    )
    .expect("seed malformed rows");
    drop(conn);

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "2", "records.list", json!({}));
    assert_eq!(listed.get("totalRows").and_then(|v| v.as_u64()), Some(2));
    let ids: Vec<&str> = listed
        .get("rows")
        .and_then(|v| v.as_array())
        .expect("rows")
        .iter()
        .filter_map(|r| r.get("id").and_then(|v| v.as_str()))
        .collect();
    assert!(!ids.contains(&"r3"));

    let by_status = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "analytics.groupCount",
        json!({ "by": "status" }),
    );
    let keys: Vec<&str> = by_status
        .get("groups")
        .and_then(|v| v.as_array())
        .expect("groups")
        .iter()
        .filter_map(|g| g.get("key").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| *k == "Informed" || *k == "Not Informed"));

    let strength = request_ok(&mut stdin, &mut reader, "4", "analytics.strength", json!({}));
    assert_eq!(strength.get("total").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(strength.get("boys").and_then(|v| v.as_u64()), Some(1));

    let students = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    let students = students.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].get("id").and_then(|v| v.as_str()), Some("s1"));

    let _ = std::fs::remove_dir_all(workspace);
}
