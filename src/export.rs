use crate::engine::RecordRow;
use anyhow::Context;
use std::path::Path;

pub const RECORDS_CSV_HEADER: [&str; 10] = [
    "S.No.",
    "Student Name",
    "Register No",
    "Department",
    "Class",
    "Date",
    "Time",
    "Status",
    "Marked By",
    "Times Late",
];

/// Writes the records table as shown, one row per record, "Times Late" being
/// the lifetime count.
pub fn write_records_csv(out_path: &Path, rows: &[RecordRow<'_>]) -> anyhow::Result<usize> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let mut wtr = csv::Writer::from_path(out_path)
        .with_context(|| format!("failed to create {}", out_path.to_string_lossy()))?;
    wtr.write_record(RECORDS_CSV_HEADER)?;
    for (i, row) in rows.iter().enumerate() {
        let r = row.record;
        wtr.write_record([
            (i + 1).to_string().as_str(),
            r.student_name.as_str(),
            r.register_no.as_str(),
            r.department_name.as_str(),
            r.class_name.as_str(),
            r.date.as_str(),
            r.time.as_str(),
            r.status.as_str(),
            r.marked_by.as_str(),
            row.lifetime_count.to_string().as_str(),
        ])?;
    }
    wtr.flush().context("failed to flush csv")?;
    Ok(rows.len())
}
