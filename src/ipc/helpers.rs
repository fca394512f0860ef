use crate::db::{self, Snapshot};
use crate::engine::{DateRange, FilterCriteria, SortDir, SortKey};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_date, Gender, LateStatus};
use rusqlite::Connection;
use serde_json::{Map, Value};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    let raw = req
        .params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(trimmed.to_string())
}

pub fn optional_str(v: Option<&Value>, key: &str) -> Result<Option<String>, HandlerErr> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

pub fn load_snapshot(conn: &Connection) -> Result<Snapshot, HandlerErr> {
    db::load_snapshot(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn parse_day(v: &Value, key: &str) -> Result<chrono::NaiveDate, HandlerErr> {
    v.as_str()
        .and_then(parse_date)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a date (YYYY-MM-DD)", key)))
}

/// `{ from, to? }`; `to` absent or null selects the single day `from`.
pub fn parse_date_range(v: &Value, key: &str) -> Result<DateRange, HandlerErr> {
    let obj = v
        .as_object()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an object", key)))?;
    let from = obj
        .get("from")
        .ok_or_else(|| HandlerErr::bad_params(format!("{}.from is required", key)))?;
    let from = parse_day(from, &format!("{}.from", key))?;
    let to = match obj.get("to") {
        None | Some(Value::Null) => None,
        Some(t) => Some(parse_day(t, &format!("{}.to", key))?),
    };
    Ok(DateRange::new(from, to))
}

/// "all" in any selector means the criterion is unset.
fn selector(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, HandlerErr> {
    let v = optional_str(obj.get(key), &format!("filters.{}", key))?;
    Ok(v.filter(|s| !s.eq_ignore_ascii_case("all")))
}

pub fn parse_filter_criteria(v: Option<&Value>) -> Result<FilterCriteria, HandlerErr> {
    let Some(value) = v else {
        return Ok(FilterCriteria::default());
    };
    if value.is_null() {
        return Ok(FilterCriteria::default());
    }
    let obj = value
        .as_object()
        .ok_or_else(|| HandlerErr::bad_params("filters must be an object"))?;

    let mut criteria = FilterCriteria::default();
    for key in obj.keys() {
        match key.as_str() {
            "dateRange" | "departmentId" | "classId" | "mentor" | "status" | "gender"
            | "search" => {}
            other => {
                return Err(HandlerErr::bad_params(format!("unknown filter: {}", other)));
            }
        }
    }

    if let Some(range) = obj.get("dateRange").filter(|v| !v.is_null()) {
        criteria.date_range = Some(parse_date_range(range, "filters.dateRange")?);
    }
    criteria.department_id = selector(obj, "departmentId")?;
    criteria.class_id = selector(obj, "classId")?;
    criteria.mentor = selector(obj, "mentor")?;
    if let Some(raw) = selector(obj, "status")? {
        criteria.status = Some(LateStatus::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("filters.status must be one of: Informed, Not Informed, Letter Given")
        })?);
    }
    if let Some(raw) = selector(obj, "gender")? {
        criteria.gender = Some(
            Gender::parse(&raw)
                .ok_or_else(|| HandlerErr::bad_params("filters.gender must be MALE or FEMALE"))?,
        );
    }
    criteria.search_text = optional_str(obj.get("search"), "filters.search")?;
    Ok(criteria)
}

#[derive(Debug, Clone, Copy)]
pub struct RecordsQuery {
    pub sort_key: SortKey,
    pub sort_dir: SortDir,
    pub page: usize,
    pub page_size: usize,
}

fn parse_sort_key(v: Option<&Value>) -> Result<SortKey, HandlerErr> {
    let Some(value) = v.filter(|v| !v.is_null()) else {
        return Ok(SortKey::Timestamp);
    };
    value.as_str().and_then(SortKey::parse).ok_or_else(|| {
        let allowed: Vec<&str> = SortKey::ALL.iter().map(|k| k.as_str()).collect();
        HandlerErr::bad_params(format!("query.sortBy must be one of: {}", allowed.join(", ")))
    })
}

fn parse_sort_dir(v: Option<&Value>, default: SortDir) -> Result<SortDir, HandlerErr> {
    let Some(value) = v.filter(|v| !v.is_null()) else {
        return Ok(default);
    };
    value
        .as_str()
        .and_then(SortDir::parse)
        .ok_or_else(|| HandlerErr::bad_params("query.sortDir must be one of: asc, desc"))
}

fn parse_page(v: Option<&Value>) -> Result<usize, HandlerErr> {
    let Some(value) = v else {
        return Ok(1);
    };
    match value.as_u64() {
        Some(0) => Err(HandlerErr::bad_params("query.page must be >= 1")),
        Some(page) => Ok(page as usize),
        None => Err(HandlerErr::bad_params("query.page must be a positive integer")),
    }
}

fn parse_page_size(v: Option<&Value>) -> Result<usize, HandlerErr> {
    let Some(value) = v else {
        return Ok(DEFAULT_PAGE_SIZE);
    };
    match value.as_u64() {
        Some(size) if size >= 1 && size as usize <= MAX_PAGE_SIZE => Ok(size as usize),
        _ => Err(HandlerErr::bad_params(format!(
            "query.pageSize must be in range 1..={}",
            MAX_PAGE_SIZE
        ))),
    }
}

pub fn parse_records_query(v: Option<&Value>, default_dir: SortDir) -> Result<RecordsQuery, HandlerErr> {
    let empty = Map::new();
    let obj = match v {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(o)) => o,
        Some(_) => return Err(HandlerErr::bad_params("query must be an object")),
    };
    Ok(RecordsQuery {
        sort_key: parse_sort_key(obj.get("sortBy"))?,
        sort_dir: parse_sort_dir(obj.get("sortDir"), default_dir)?,
        page: parse_page(obj.get("page"))?,
        page_size: parse_page_size(obj.get("pageSize"))?,
    })
}

pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Vec<T> {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    if start >= items.len() {
        return Vec::new();
    }
    let end = std::cmp::min(start + page_size, items.len());
    items[start..end].to_vec()
}
