use crate::db;
use crate::engine::{BatchPlan, SortDir, DEFAULT_TOP_COUNT, DEFAULT_WARNING_THRESHOLD};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

pub const DEFAULT_SCHOOL_NAME: &str = "SVCET";

#[derive(Clone, Copy)]
enum SetupSection {
    LateTracking,
    School,
    Batches,
}

impl SetupSection {
    const ALL: [SetupSection; 3] = [
        SetupSection::LateTracking,
        SetupSection::School,
        SetupSection::Batches,
    ];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "lateTracking" => Some(Self::LateTracking),
            "school" => Some(Self::School),
            "batches" => Some(Self::Batches),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::LateTracking => "lateTracking",
            Self::School => "school",
            Self::Batches => "batches",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::LateTracking => "setup.lateTracking",
            Self::School => "setup.school",
            Self::Batches => "setup.batches",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::LateTracking => json!({
            "warningThreshold": DEFAULT_WARNING_THRESHOLD,
            "topCount": DEFAULT_TOP_COUNT,
            "defaultSortDir": "desc"
        }),
        SetupSection::School => json!({
            "name": DEFAULT_SCHOOL_NAME
        }),
        SetupSection::Batches => {
            let plan = BatchPlan::default();
            json!({
                "yearLabels": plan.year_labels,
                "pgDepartments": plan.pg_departments,
                "pgYearLabels": plan.pg_year_labels
            })
        }
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_string_list(
    v: &Value,
    key: &str,
    min_items: usize,
    max_items: usize,
    max_len: usize,
) -> Result<Vec<String>, String> {
    let items = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if items.len() < min_items || items.len() > max_items {
        return Err(format!("{} must have {}..={} entries", key, min_items, max_items));
    }
    items
        .iter()
        .map(|item| {
            let s = parse_string_max(item, key, max_len)?;
            if s.is_empty() {
                return Err(format!("{} entries must not be empty", key));
            }
            Ok(s)
        })
        .collect()
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::LateTracking => match k.as_str() {
                "warningThreshold" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 50)?));
                }
                "topCount" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 100)?));
                }
                "defaultSortDir" => {
                    let s = parse_string_max(v, k, 8)?;
                    let dir = SortDir::parse(&s)
                        .ok_or_else(|| "defaultSortDir must be one of: asc, desc".to_string())?;
                    obj.insert(k.clone(), Value::String(dir.as_str().to_string()));
                }
                _ => return Err(format!("unknown lateTracking field: {}", k)),
            },
            SetupSection::School => match k.as_str() {
                "name" => {
                    let s = parse_string_max(v, k, 120)?;
                    if s.is_empty() {
                        return Err("name must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown school field: {}", k)),
            },
            SetupSection::Batches => match k.as_str() {
                "yearLabels" | "pgYearLabels" => {
                    obj.insert(k.clone(), json!(parse_string_list(v, k, 1, 4, 16)?));
                }
                "pgDepartments" => {
                    obj.insert(k.clone(), json!(parse_string_list(v, k, 0, 64, 120)?));
                }
                _ => return Err(format!("unknown batches field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Stale or hand-edited values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                if merge_section_patch(section, &mut current, &one).is_err() {
                    log::warn!("ignoring invalid saved setting {}.{}", section.name(), k);
                }
            }
        }
    }
    Ok(current)
}

/// Typed view of the `lateTracking` section.
#[derive(Debug, Clone, Copy)]
pub struct LateTracking {
    pub warning_threshold: usize,
    pub top_count: usize,
    pub default_sort_dir: SortDir,
}

pub fn load_late_tracking(conn: &rusqlite::Connection) -> anyhow::Result<LateTracking> {
    let v = load_section(conn, SetupSection::LateTracking)?;
    Ok(LateTracking {
        warning_threshold: v
            .get("warningThreshold")
            .and_then(|n| n.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_WARNING_THRESHOLD),
        top_count: v
            .get("topCount")
            .and_then(|n| n.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_TOP_COUNT),
        default_sort_dir: v
            .get("defaultSortDir")
            .and_then(|s| s.as_str())
            .and_then(SortDir::parse)
            .unwrap_or(SortDir::Desc),
    })
}

pub fn load_school_name(conn: &rusqlite::Connection) -> anyhow::Result<String> {
    let v = load_section(conn, SetupSection::School)?;
    Ok(v.get("name")
        .and_then(|s| s.as_str())
        .unwrap_or(DEFAULT_SCHOOL_NAME)
        .to_string())
}

pub fn load_batch_plan(conn: &rusqlite::Connection) -> anyhow::Result<BatchPlan> {
    let v = load_section(conn, SetupSection::Batches)?;
    let list = |key: &str| -> Option<Vec<String>> {
        v.get(key)?
            .as_array()?
            .iter()
            .map(|s| s.as_str().map(str::to_string))
            .collect()
    };
    let defaults = BatchPlan::default();
    Ok(BatchPlan {
        year_labels: list("yearLabels").unwrap_or(defaults.year_labels),
        pg_departments: list("pgDepartments").unwrap_or(defaults.pg_departments),
        pg_year_labels: list("pgYearLabels").unwrap_or(defaults.pg_year_labels),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    log::info!("setup section {} updated", section.name());
    ok(
        &req.id,
        json!({ "ok": true, "section": section.name(), "value": current }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
