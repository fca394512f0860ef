#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;

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

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("tardymark-backup-src");
    let workspace2 = temp_dir("tardymark-backup-dst");
    let out_dir = temp_dir("tardymark-backup-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join("tardymark.sqlite3"), bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 2);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.db_sha256));
    let parsed: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(parsed.get("version").and_then(|v| v.as_u64()), Some(1));
    assert!(parsed.get("exportedAt").and_then(|v| v.as_str()).is_some());
    archive
        .by_name("db/tardymark.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = std::fs::read(workspace2.join("tardymark.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn plain_sqlite_import_is_supported() {
    let out_dir = temp_dir("tardymark-backup-plain");
    let workspace = temp_dir("tardymark-backup-plain-dst");

    let plain_file = out_dir.join("copy.sqlite3");
    let bytes = b"plain-sqlite-copy";
    std::fs::write(&plain_file, bytes).expect("write plain sqlite file");

    let import =
        backup::import_workspace_bundle(&plain_file, &workspace).expect("import plain sqlite");
    assert_eq!(import.bundle_format_detected, "sqlite3");

    let restored = std::fs::read(workspace.join("tardymark.sqlite3")).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn checksum_mismatch_leaves_current_database_alone() {
    let out_dir = temp_dir("tardymark-backup-tampered");
    let workspace = temp_dir("tardymark-backup-tampered-dst");
    std::fs::write(workspace.join("tardymark.sqlite3"), b"current").expect("write current db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = FileOptions::default();
        zip.start_file("manifest.json", opts).expect("start manifest");
        zip.write_all(
            format!(
                "{{\"format\":\"{}\",\"version\":1,\"dbSha256\":\"{}\"}}",
                backup::BUNDLE_FORMAT_V1,
                "0".repeat(64)
            )
            .as_bytes(),
        )
        .expect("write manifest");
        zip.start_file("db/tardymark.sqlite3", opts).expect("start db");
        zip.write_all(b"tampered").expect("write db");
        zip.finish().expect("finish zip");
    }

    let result = backup::import_workspace_bundle(&bundle_path, &workspace);
    assert!(result.is_err());
    let current = std::fs::read(workspace.join("tardymark.sqlite3")).expect("read current db");
    assert_eq!(current, b"current");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn newer_or_foreign_bundles_are_refused() {
    let out_dir = temp_dir("tardymark-backup-foreign");
    let workspace = temp_dir("tardymark-backup-foreign-dst");
    std::fs::write(workspace.join("tardymark.sqlite3"), b"current").expect("write current db");

    for (name, manifest) in [
        ("newer.zip", format!("{{\"format\":\"{}\",\"version\":2}}", backup::BUNDLE_FORMAT_V1)),
        ("foreign.zip", "{\"format\":\"other-app-v1\",\"version\":1}".to_string()),
        ("broken.zip", "not json".to_string()),
    ] {
        let bundle_path = out_dir.join(name);
        {
            let f = File::create(&bundle_path).expect("create bundle");
            let mut zip = zip::ZipWriter::new(f);
            let opts = FileOptions::default();
            zip.start_file("manifest.json", opts).expect("start manifest");
            zip.write_all(manifest.as_bytes()).expect("write manifest");
            zip.start_file("db/tardymark.sqlite3", opts).expect("start db");
            zip.write_all(b"replacement").expect("write db");
            zip.finish().expect("finish zip");
        }
        assert!(backup::import_workspace_bundle(&bundle_path, &workspace).is_err(), "{}", name);
    }
    let current = std::fs::read(workspace.join("tardymark.sqlite3")).expect("read current db");
    assert_eq!(current, b"current");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
