//! Workspace bundles: a zip holding `manifest.json` and the SQLite file.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const BUNDLE_FORMAT_V1: &str = "tardymark-workspace-v1";
const MANIFEST_VERSION: u32 = 1;
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/tardymark.sqlite3";
const DB_FILE_NAME: &str = "tardymark.sqlite3";
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    version: u32,
    #[serde(default)]
    app_version: Option<String>,
    #[serde(default)]
    exported_at: Option<String>,
    #[serde(default)]
    db_sha256: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> anyhow::Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("bundle has no {} entry", name))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("reading bundle entry {}", name))?;
    Ok(bytes)
}

/// Stages the bytes beside `dst`, then renames over it.
fn replace_file(dst: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let staging = dst.with_extension("sqlite3.importing");
    {
        let mut f = File::create(&staging)
            .with_context(|| format!("creating {}", staging.display()))?;
        f.write_all(bytes)
            .and_then(|_| f.sync_all())
            .with_context(|| format!("writing {}", staging.display()))?;
    }
    if dst.exists() {
        std::fs::remove_file(dst).with_context(|| format!("removing {}", dst.display()))?;
    }
    std::fs::rename(&staging, dst)
        .with_context(|| format!("moving {} into place", staging.display()))?;
    Ok(())
}

fn looks_like_zip(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut head = [0u8; 4];
    match f.read_exact(&mut head) {
        Ok(()) => Ok(head == ZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

pub fn export_workspace_bundle(workspace_path: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("no database in workspace {}", workspace_path.display());
    }
    let db_bytes = std::fs::read(&db_path).with_context(|| format!("reading {}", db_path.display()))?;
    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        version: MANIFEST_VERSION,
        app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        exported_at: Some(chrono::Local::now().to_rfc3339()),
        db_sha256: Some(sha256_hex(&db_bytes)),
    };

    if let Some(dir) = out_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let out = File::create(out_path).with_context(|| format!("creating {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let entries: [(&str, Vec<u8>); 2] = [
        (MANIFEST_ENTRY, serde_json::to_vec_pretty(&manifest)?),
        (DB_ENTRY, db_bytes),
    ];
    for (name, bytes) in &entries {
        zip.start_file(*name, opts)
            .with_context(|| format!("adding bundle entry {}", name))?;
        zip.write_all(bytes)
            .with_context(|| format!("writing bundle entry {}", name))?;
    }
    zip.finish().context("finishing bundle")?;

    Ok(ExportSummary {
        bundle_format: manifest.format,
        entry_count: entries.len(),
        db_sha256: manifest.db_sha256.unwrap_or_default(),
    })
}

/// Restores a bundle, or a bare SQLite file, into `workspace_path`. A bundle
/// is fully checked before the current database is replaced.
pub fn import_workspace_bundle(in_path: &Path, workspace_path: &Path) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("creating {}", workspace_path.display()))?;
    let dst = workspace_path.join(DB_FILE_NAME);

    if !looks_like_zip(in_path)? {
        let bytes = std::fs::read(in_path).with_context(|| format!("reading {}", in_path.display()))?;
        replace_file(&dst, &bytes)?;
        return Ok(ImportSummary {
            bundle_format_detected: "sqlite3".to_string(),
        });
    }

    let file = File::open(in_path).with_context(|| format!("opening {}", in_path.display()))?;
    let mut archive = ZipArchive::new(file).context("bundle is not a readable zip")?;
    let manifest: Manifest = serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)
        .context("manifest.json is malformed")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format {:?}", manifest.format);
    }
    if manifest.version > MANIFEST_VERSION {
        bail!("bundle version {} is newer than this app supports", manifest.version);
    }

    let db_bytes = read_entry(&mut archive, DB_ENTRY)?;
    if let Some(expected) = manifest.db_sha256.as_deref() {
        let actual = sha256_hex(&db_bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            bail!("database checksum mismatch (manifest {}, bundle {})", expected, actual);
        }
    }
    replace_file(&dst, &db_bytes)?;

    Ok(ImportSummary {
        bundle_format_detected: manifest.format,
    })
}
