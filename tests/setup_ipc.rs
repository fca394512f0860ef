mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn setup_defaults_persist_and_validate() {
    let workspace = temp_dir("tardymark-setup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let defaults = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(
        defaults.pointer("/lateTracking/warningThreshold").and_then(|v| v.as_u64()),
        Some(3)
    );
    assert_eq!(defaults.pointer("/lateTracking/topCount").and_then(|v| v.as_u64()), Some(10));
    assert_eq!(
        defaults.pointer("/lateTracking/defaultSortDir").and_then(|v| v.as_str()),
        Some("desc")
    );
    assert_eq!(defaults.pointer("/school/name").and_then(|v| v.as_str()), Some("SVCET"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({
            "section": "lateTracking",
            "patch": { "warningThreshold": 5, "topCount": 25, "defaultSortDir": "ASC" }
        }),
    );

    for (id, patch) in [
        ("4", json!({ "warningThreshold": 51 })),
        ("5", json!({ "topCount": 0 })),
        ("6", json!({ "defaultSortDir": "sideways" })),
        ("7", json!({ "colour": "blue" })),
    ] {
        let bad = request(
            &mut stdin,
            &mut reader,
            id,
            "setup.update",
            json!({ "section": "lateTracking", "patch": patch }),
        );
        assert_eq!(error_code(&bad), Some("bad_params"), "patch {}", id);
    }
    let unknown = request(
        &mut stdin,
        &mut reader,
        "8",
        "setup.update",
        json!({ "section": "printer", "patch": {} }),
    );
    assert_eq!(error_code(&unknown), Some("bad_params"));

    drop(stdin);
    drop(reader);

    // Settings survive a restart.
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let saved = request_ok(&mut stdin, &mut reader, "10", "setup.get", json!({}));
    assert_eq!(saved.pointer("/lateTracking/warningThreshold").and_then(|v| v.as_u64()), Some(5));
    assert_eq!(saved.pointer("/lateTracking/topCount").and_then(|v| v.as_u64()), Some(25));
    assert_eq!(
        saved.pointer("/lateTracking/defaultSortDir").and_then(|v| v.as_str()),
        Some("asc")
    );

    let listed = request_ok(&mut stdin, &mut reader, "11", "records.list", json!({}));
    assert_eq!(listed.get("sortDir").and_then(|v| v.as_str()), Some("asc"));
    assert_eq!(listed.get("warningThreshold").and_then(|v| v.as_u64()), Some(5));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn batch_labels_default_and_validate() {
    let workspace = temp_dir("tardymark-setup-batches");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let defaults = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(
        defaults.pointer("/batches/yearLabels/0").and_then(|v| v.as_str()),
        Some("2025-29")
    );
    assert_eq!(defaults.pointer("/batches/pgDepartments/0").and_then(|v| v.as_str()), Some("MBA"));
    assert_eq!(
        defaults.pointer("/batches/pgYearLabels").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    for (id, patch) in [
        ("3", json!({ "yearLabels": [] })),
        ("4", json!({ "yearLabels": ["a", "b", "c", "d", "e"] })),
        ("5", json!({ "pgYearLabels": ["  "] })),
        ("6", json!({ "pgDepartments": "MBA" })),
    ] {
        let bad = request(
            &mut stdin,
            &mut reader,
            id,
            "setup.update",
            json!({ "section": "batches", "patch": patch }),
        );
        assert_eq!(error_code(&bad), Some("bad_params"), "patch {}", id);
    }

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "setup.update",
        json!({ "section": "batches", "patch": { "pgDepartments": [] } }),
    );
    assert_eq!(
        updated.pointer("/value/pgDepartments").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
    assert_eq!(
        updated.pointer("/value/yearLabels/3").and_then(|v| v.as_str()),
        Some("2022-26")
    );

    let _ = std::fs::remove_dir_all(workspace);
}
