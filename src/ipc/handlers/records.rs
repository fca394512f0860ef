use crate::db;
use crate::engine::{self, Directory, RecordRow};
use crate::export;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::{load_late_tracking, load_school_name};
use crate::ipc::helpers::{
    db_conn, load_snapshot, optional_str, paginate, parse_filter_criteria, parse_records_query,
    required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{format_timestamp, parse_date, parse_timestamp, LateRecord, LateStatus, Student};
use chrono::NaiveDateTime;
use serde_json::{json, Value};
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_MARKED_BY: &str = "Admin Staff";
const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";
const DISPLAY_TIME_FORMAT: &str = "%H:%M:%S";

pub fn row_json(row: &RecordRow<'_>, warning_threshold: usize) -> Value {
    let r = row.record;
    json!({
        "id": r.id,
        "studentId": r.student_id,
        "studentName": r.student_name,
        "registerNo": r.register_no,
        "gender": row.gender(),
        "departmentName": r.department_name,
        "className": r.class_name,
        "date": r.date,
        "time": r.time,
        "timestamp": r.timestamp,
        "markedBy": r.marked_by,
        "status": r.status,
        "mentor": row.mentor(),
        "resolved": row.student.is_some(),
        "lifetimeCount": row.lifetime_count,
        "periodCount": row.period_count,
        "warning": row.is_warning(warning_threshold)
    })
}

fn parent_notice(student: &Student, record: &LateRecord, school: &str) -> Option<Value> {
    if record.status != LateStatus::NotInformed {
        return None;
    }
    let phone = student
        .parent_phone_number
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())?;
    let message = format!(
        "Dear Parent, your ward {} ({}) has been marked late to college today, {}. Thank you, {}.",
        record.student_name, record.register_no, record.date, school
    );
    Some(json!({ "phone": phone, "message": message }))
}

fn records_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let status_raw = required_str(req, "status")?;
    let status = LateStatus::parse(&status_raw).ok_or_else(|| {
        HandlerErr::bad_params("status must be one of: Informed, Not Informed, Letter Given")
    })?;
    let marked_by = optional_str(req.params.get("markedBy"), "markedBy")?
        .unwrap_or_else(|| DEFAULT_MARKED_BY.to_string());
    let at: NaiveDateTime = match optional_str(req.params.get("timestamp"), "timestamp")? {
        Some(raw) => parse_timestamp(&raw)
            .ok_or_else(|| HandlerErr::bad_params("timestamp must be an ISO-8601 date-time"))?,
        None => chrono::Local::now().naive_local(),
    };

    let query_err = |e: anyhow::Error| HandlerErr::new("db_query_failed", e.to_string());
    let student = db::get_student(conn, &student_id)
        .map_err(query_err)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    let department = db::get_department(conn, &student.department_id).map_err(query_err)?;
    let class = db::get_class(conn, &student.class_id).map_err(query_err)?;

    let record = LateRecord {
        id: Uuid::new_v4().to_string(),
        student_id: Some(student.id.clone()),
        student_name: student.name.clone(),
        register_no: student.register_no.clone(),
        gender: Some(student.gender),
        department_name: department.map(|d| d.name).unwrap_or_default(),
        class_name: class.map(|c| c.name).unwrap_or_default(),
        date: at.format(DISPLAY_DATE_FORMAT).to_string(),
        time: at.format(DISPLAY_TIME_FORMAT).to_string(),
        timestamp: Some(format_timestamp(at)),
        marked_by,
        status,
    };
    db::insert_late_record(conn, &record).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "late_records" }))
    })?;

    let school = load_school_name(conn).map_err(query_err)?;
    let notice = parent_notice(&student, &record, &school);

    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let lifetime_count = engine::lifetime_late_count(&dir, &snap.records, &dir.student_key(&record));

    log::info!(
        "late record {} for student {} ({})",
        record.id,
        student.id,
        record.status.as_str()
    );
    Ok(json!({
        "record": record,
        "lifetimeCount": lifetime_count,
        "parentNotice": notice
    }))
}

fn records_list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let settings = load_late_tracking(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let criteria = parse_filter_criteria(req.params.get("filters"))?;
    let query = parse_records_query(req.params.get("query"), settings.default_sort_dir)?;

    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let filtered = engine::filter_records(&dir, &snap.records, &criteria);
    let mut rows = engine::annotate(&dir, &snap.records, &filtered, criteria.date_range.as_ref());
    engine::sort_rows(&mut rows, query.sort_key, query.sort_dir);

    let total = rows.len();
    let page_rows: Vec<Value> = paginate(&rows, query.page, query.page_size)
        .iter()
        .map(|row| row_json(row, settings.warning_threshold))
        .collect();
    Ok(json!({
        "totalRows": total,
        "page": query.page,
        "pageSize": query.page_size,
        "sortBy": query.sort_key.as_str(),
        "sortDir": query.sort_dir.as_str(),
        "warningThreshold": settings.warning_threshold,
        "rows": page_rows
    }))
}

fn records_export_csv(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let out_path = PathBuf::from(required_str(req, "outPath")?);
    let settings = load_late_tracking(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let criteria = parse_filter_criteria(req.params.get("filters"))?;
    let query = parse_records_query(req.params.get("query"), settings.default_sort_dir)?;

    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let filtered = engine::filter_records(&dir, &snap.records, &criteria);
    let mut rows = engine::annotate(&dir, &snap.records, &filtered, criteria.date_range.as_ref());
    engine::sort_rows(&mut rows, query.sort_key, query.sort_dir);

    let written = export::write_records_csv(&out_path, &rows).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:?}"))
            .with_details(json!({ "outPath": out_path.to_string_lossy() }))
    })?;
    log::info!("exported {} late records to {}", written, out_path.to_string_lossy());
    Ok(json!({
        "outPath": out_path.to_string_lossy(),
        "rowCount": written
    }))
}

fn records_purge(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let before = match optional_str(req.params.get("before"), "before")? {
        Some(raw) => Some(
            parse_date(&raw).ok_or_else(|| HandlerErr::bad_params("before must be a date (YYYY-MM-DD)"))?,
        ),
        None => None,
    };
    let conn = state
        .db
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let delete_err = |e: anyhow::Error| HandlerErr::new("db_delete_failed", e.to_string());

    let removed = match before {
        None => db::delete_all_late_records(conn).map_err(delete_err)?,
        Some(day) => {
            let cutoff = day
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| HandlerErr::bad_params("before is out of range"))?;
            let records = db::list_late_records(conn)
                .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
            // Records without a readable timestamp are never purged by date.
            let ids: Vec<String> = records
                .into_iter()
                .filter(|r| r.instant().map_or(false, |t| t < cutoff))
                .map(|r| r.id)
                .collect();
            db::delete_late_records(conn, &ids).map_err(delete_err)?
        }
    };
    log::info!("purged {} late records", removed);
    Ok(json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "records.create" => records_create(state, req),
        "records.list" => records_list(state, req),
        "records.exportCsv" => records_export_csv(state, req),
        "records.purge" => records_purge(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
