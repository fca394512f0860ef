use crate::db;
use crate::engine::{self, Directory, StudentKey};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{db_conn, load_snapshot, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{Gender, Student};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use uuid::Uuid;

fn parse_gender(v: Option<&Value>) -> Result<Gender, HandlerErr> {
    v.and_then(|v| v.as_str())
        .and_then(Gender::parse)
        .ok_or_else(|| HandlerErr::bad_params("gender must be MALE or FEMALE"))
}

fn name_field(v: Option<&Value>, key: &str) -> Result<String, HandlerErr> {
    optional_str(v, key)?.ok_or_else(|| HandlerErr::bad_params(format!("{} must not be empty", key)))
}

/// The class must exist and sit under the department.
fn check_placement(conn: &Connection, department_id: &str, class_id: &str) -> Result<(), HandlerErr> {
    let class = db::get_class(conn, class_id)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
        .ok_or_else(|| HandlerErr::new("not_found", "class not found"))?;
    if class.department_id != department_id {
        return Err(HandlerErr::bad_params("class does not belong to department").with_details(
            json!({ "classId": class_id, "departmentId": department_id }),
        ));
    }
    Ok(())
}

fn students_list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = optional_str(req.params.get("classId"), "classId")?;
    let department_id = optional_str(req.params.get("departmentId"), "departmentId")?;
    let snap = load_snapshot(conn)?;
    let dir = Directory::new(&snap.departments, &snap.classes, &snap.students);
    let lifetime = engine::lifetime_counts(&dir, &snap.records);

    let students: Vec<Value> = snap
        .students
        .iter()
        .filter(|s| class_id.as_deref().map_or(true, |c| s.class_id == c))
        .filter(|s| department_id.as_deref().map_or(true, |d| s.department_id == d))
        .map(|s| {
            let late_count = lifetime
                .get(&StudentKey::Id(s.id.clone()))
                .copied()
                .unwrap_or(0);
            json!({
                "id": s.id,
                "name": s.name,
                "departmentId": s.department_id,
                "departmentName": dir.department(&s.department_id).map(|d| d.name.as_str()),
                "classId": s.class_id,
                "className": dir.class(&s.class_id).map(|c| c.name.as_str()),
                "registerNo": s.register_no,
                "gender": s.gender,
                "parentPhoneNumber": s.parent_phone_number,
                "mentor": s.mentor,
                "lateCount": late_count
            })
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn students_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let name = required_str(req, "name")?;
    let department_id = required_str(req, "departmentId")?;
    let class_id = required_str(req, "classId")?;
    let gender = parse_gender(req.params.get("gender"))?;
    let register_no = optional_str(req.params.get("registerNo"), "registerNo")?.unwrap_or_default();
    let parent_phone_number = optional_str(req.params.get("parentPhoneNumber"), "parentPhoneNumber")?;
    let mentor = optional_str(req.params.get("mentor"), "mentor")?;

    check_placement(conn, &department_id, &class_id)?;

    let student = Student {
        id: Uuid::new_v4().to_string(),
        name,
        department_id,
        class_id,
        register_no,
        gender,
        parent_phone_number,
        mentor,
    };
    db::insert_student(conn, &student).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "students" }))
    })?;
    log::info!("student {} created", student.id);
    Ok(json!({ "student": student }))
}

fn apply_patch(student: &mut Student, patch: &Map<String, Value>) -> Result<(), HandlerErr> {
    for (k, v) in patch {
        match k.as_str() {
            "name" => student.name = name_field(Some(v), k)?,
            "departmentId" => student.department_id = name_field(Some(v), k)?,
            "classId" => student.class_id = name_field(Some(v), k)?,
            "registerNo" => student.register_no = optional_str(Some(v), k)?.unwrap_or_default(),
            "gender" => student.gender = parse_gender(Some(v))?,
            "parentPhoneNumber" => student.parent_phone_number = optional_str(Some(v), k)?,
            "mentor" => student.mentor = optional_str(Some(v), k)?,
            other => {
                return Err(HandlerErr::bad_params(format!("unknown student field: {}", other)));
            }
        }
    }
    Ok(())
}

fn students_update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let patch = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let mut student = db::get_student(conn, &student_id)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    apply_patch(&mut student, patch)?;
    if patch.contains_key("classId") && !patch.contains_key("departmentId") {
        // Moving class implies the class's department.
        let class = db::get_class(conn, &student.class_id)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
            .ok_or_else(|| HandlerErr::new("not_found", "class not found"))?;
        student.department_id = class.department_id;
    }
    check_placement(conn, &student.department_id, &student.class_id)?;

    db::update_student(conn, &student)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "student": student }))
}

fn students_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let removed = db::delete_student(conn, &student_id)
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if !removed {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    log::info!("student {} deleted; late records kept", student_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, req),
        "students.create" => students_create(state, req),
        "students.update" => students_update(state, req),
        "students.delete" => students_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
