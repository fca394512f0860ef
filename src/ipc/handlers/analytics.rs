use crate::engine::{self, AggregateOptions, Directory, GroupBy, PeriodSummary};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::records::row_json;
use crate::ipc::handlers::setup::{load_batch_plan, load_late_tracking, LateTracking};
use crate::ipc::helpers::{
    db_conn, load_snapshot, parse_date_range, parse_filter_criteria, parse_records_query,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{json, Value};

const MAX_TOP_COUNT: u64 = 100;

fn late_tracking(conn: &Connection) -> Result<LateTracking, HandlerErr> {
    load_late_tracking(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn counts_json(counts: &[(String, usize)]) -> Vec<Value> {
    counts
        .iter()
        .map(|(key, count)| json!({ "key": key, "count": count }))
        .collect()
}

fn summary_json(s: &PeriodSummary) -> Value {
    json!({
        "totalRecords": s.total_records,
        "lateStudents": s.late_students,
        "boys": s.boys,
        "girls": s.girls,
        "departmentCounts": counts_json(&s.department_counts)
    })
}

fn series_json(points: &[(NaiveDate, usize)], fmt: &str) -> Vec<Value> {
    points
        .iter()
        .map(|(d, count)| json!({ "bucket": d.format(fmt).to_string(), "count": count }))
        .collect()
}

fn stats_summary(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let criteria = parse_filter_criteria(req.params.get("filters"))?;
    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let filtered = engine::filter_records(&dir, &snap.records, &criteria);
    Ok(summary_json(&engine::summarize(&dir, &filtered)))
}

fn group_count(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let by = req
        .params
        .get("by")
        .and_then(|v| v.as_str())
        .and_then(GroupBy::parse)
        .ok_or_else(|| {
            HandlerErr::bad_params("by must be one of: department, gender, status, class, markedBy")
        })?;
    let criteria = parse_filter_criteria(req.params.get("filters"))?;
    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let filtered = engine::filter_records(&dir, &snap.records, &criteria);
    let groups = engine::group_by(&dir, filtered.iter().copied(), by);
    Ok(json!({
        "by": by.as_str(),
        "total": filtered.len(),
        "groups": counts_json(&groups)
    }))
}

/// The series window replaces any date range given in `filters`.
fn series(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let interval = req.params.get("interval").and_then(|v| v.as_str()).unwrap_or("day");
    if interval != "day" && interval != "month" {
        return Err(HandlerErr::bad_params("interval must be one of: day, month"));
    }
    let range = parse_date_range(&req.params, "params")?;
    let (buckets, cap) = if interval == "day" {
        (range.day_count(), engine::MAX_DAY_BUCKETS)
    } else {
        (range.month_count(), engine::MAX_MONTH_BUCKETS)
    };
    if buckets > cap {
        return Err(HandlerErr::bad_params(format!(
            "range spans {} {}s; at most {} allowed",
            buckets, interval, cap
        ))
        .with_details(json!({ "interval": interval, "buckets": buckets, "max": cap })));
    }
    let mut criteria = parse_filter_criteria(req.params.get("filters"))?;
    criteria.date_range = Some(range);

    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let filtered = engine::filter_records(&dir, &snap.records, &criteria);
    let points = if interval == "day" {
        series_json(&engine::day_series(filtered.iter().copied(), &range), "%Y-%m-%d")
    } else {
        series_json(&engine::month_series(filtered.iter().copied(), &range), "%Y-%m")
    };
    Ok(json!({
        "interval": interval,
        "from": range.from.format("%Y-%m-%d").to_string(),
        "to": range.last_day().format("%Y-%m-%d").to_string(),
        "points": points
    }))
}

fn top_latecomers(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let settings = late_tracking(conn)?;
    let n = match req.params.get("n") {
        None | Some(Value::Null) => settings.top_count,
        Some(v) => match v.as_u64() {
            Some(n) if (1..=MAX_TOP_COUNT).contains(&n) => n as usize,
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "n must be in range 1..={}",
                    MAX_TOP_COUNT
                )))
            }
        },
    };
    let group_by_student = match req.params.get("groupByStudent") {
        None | Some(Value::Null) => true,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params("groupByStudent must be boolean"))?,
    };
    let criteria = parse_filter_criteria(req.params.get("filters"))?;

    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let filtered: Vec<_> = engine::filter_records(&dir, &snap.records, &criteria)
        .into_iter()
        .cloned()
        .collect();
    let entries = engine::top_n(&dir, &filtered, n, group_by_student);
    Ok(json!({ "n": n, "entries": entries }))
}

fn department_gender(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let criteria = parse_filter_criteria(req.params.get("filters"))?;
    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let filtered = engine::filter_records(&dir, &snap.records, &criteria);
    Ok(json!({ "departments": engine::department_gender_breakdown(&dir, &filtered) }))
}

fn strength(state: &AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let departments = engine::class_strength(&dir);
    let boys: usize = departments.iter().map(|d| d.boys).sum();
    let girls: usize = departments.iter().map(|d| d.girls).sum();
    Ok(json!({
        "departments": departments,
        "boys": boys,
        "girls": girls,
        "total": boys + girls
    }))
}

fn batch_strength(state: &AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let plan = load_batch_plan(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let batches = engine::batch_strength(&dir, &plan);
    let total: usize = batches.iter().map(|b| b.total).sum();
    Ok(json!({ "batches": batches, "total": total }))
}

fn overview(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let settings = late_tracking(conn)?;
    let criteria = parse_filter_criteria(req.params.get("filters"))?;
    let query = parse_records_query(req.params.get("query"), settings.default_sort_dir)?;
    let opts = AggregateOptions {
        sort_key: query.sort_key,
        sort_dir: query.sort_dir,
        warning_threshold: settings.warning_threshold,
        top_count: settings.top_count,
    };

    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let result = engine::aggregate(&dir, &snap.records, &criteria, &opts);
    let warnings = result
        .rows
        .iter()
        .filter(|row| row.is_warning(opts.warning_threshold))
        .count();
    Ok(json!({
        "rows": result.rows.iter().map(|row| row_json(row, opts.warning_threshold)).collect::<Vec<_>>(),
        "warningRows": warnings,
        "summary": summary_json(&result.summary),
        "byGender": counts_json(&result.by_gender),
        "topOffenders": result.top_offenders,
        "daySeries": series_json(&result.day_series, "%Y-%m-%d"),
        "monthSeries": series_json(&result.month_series, "%Y-%m")
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "stats.summary" => stats_summary(state, req),
        "analytics.groupCount" => group_count(state, req),
        "analytics.series" => series(state, req),
        "analytics.topLatecomers" => top_latecomers(state, req),
        "analytics.departmentGender" => department_gender(state, req),
        "analytics.strength" => strength(state, req),
        "analytics.batchStrength" => batch_strength(state, req),
        "analytics.overview" => overview(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
