use crate::model::{Class, Department, Gender, LateRecord, LateStatus, Student};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;

pub const DB_FILE_NAME: &str = "tardymark.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            department_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_department ON classes(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            register_no TEXT NOT NULL DEFAULT '',
            gender TEXT NOT NULL,
            parent_phone_number TEXT,
            mentor TEXT,
            FOREIGN KEY(department_id) REFERENCES departments(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    // Mentor arrived after the first student imports.
    ensure_students_mentor(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    // No foreign key on student_id: records outlive the students they name.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS late_records(
            id TEXT PRIMARY KEY,
            student_id TEXT,
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
        )",
        [],
    )?;
    ensure_late_records_student_id(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_late_records_student ON late_records(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_late_records_timestamp ON late_records(timestamp)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_mentor(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "mentor")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN mentor TEXT", [])?;
    Ok(())
}

fn ensure_late_records_student_id(conn: &Connection) -> anyhow::Result<()> {
    // Older workspaces only stored names; those rows keep NULL and resolve by name.
    if table_has_column(conn, "late_records", "student_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE late_records ADD COLUMN student_id TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        // Unreadable values fall back to defaults rather than blocking the caller.
        Some(text) => Ok(serde_json::from_str(&text).ok()),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn list_departments(conn: &Connection) -> anyhow::Result<Vec<Department>> {
    let mut stmt = conn.prepare("SELECT id, name FROM departments ORDER BY name, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Department {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_classes(conn: &Connection) -> anyhow::Result<Vec<Class>> {
    let mut stmt = conn.prepare("SELECT id, department_id, name FROM classes ORDER BY name, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Class {
                id: r.get(0)?,
                department_id: r.get(1)?,
                name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `None` when the stored gender is not one the app writes.
fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Option<Student>> {
    let id: String = r.get(0)?;
    let gender_raw: String = r.get(5)?;
    let Some(gender) = Gender::parse(&gender_raw) else {
        log::warn!("skipping student {}: unknown gender {:?}", id, gender_raw);
        return Ok(None);
    };
    Ok(Some(Student {
        id,
        name: r.get(1)?,
        department_id: r.get(2)?,
        class_id: r.get(3)?,
        register_no: r.get(4)?,
        gender,
        parent_phone_number: r.get(6)?,
        mentor: r.get(7)?,
    }))
}

const STUDENT_COLUMNS: &str =
    "id, name, department_id, class_id, register_no, gender, parent_phone_number, mentor";

pub fn list_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students ORDER BY register_no, name, id",
        STUDENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().flatten().collect())
}

pub fn get_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    Ok(conn
        .query_row(&sql, [student_id], student_from_row)
        .optional()?
        .flatten())
}

pub fn get_department(conn: &Connection, id: &str) -> anyhow::Result<Option<Department>> {
    Ok(conn
        .query_row("SELECT id, name FROM departments WHERE id = ?", [id], |r| {
            Ok(Department {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })
        .optional()?)
}

pub fn get_class(conn: &Connection, id: &str) -> anyhow::Result<Option<Class>> {
    Ok(conn
        .query_row(
            "SELECT id, department_id, name FROM classes WHERE id = ?",
            [id],
            |r| {
                Ok(Class {
                    id: r.get(0)?,
                    department_id: r.get(1)?,
                    name: r.get(2)?,
                })
            },
        )
        .optional()?)
}

pub fn insert_student(conn: &Connection, s: &Student) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO students(id, name, department_id, class_id, register_no, gender, parent_phone_number, mentor)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &s.id,
            &s.name,
            &s.department_id,
            &s.class_id,
            &s.register_no,
            s.gender.as_str(),
            &s.parent_phone_number,
            &s.mentor,
        ),
    )?;
    Ok(())
}

pub fn update_student(conn: &Connection, s: &Student) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE students
         SET name = ?, department_id = ?, class_id = ?, register_no = ?, gender = ?,
             parent_phone_number = ?, mentor = ?
         WHERE id = ?",
        (
            &s.name,
            &s.department_id,
            &s.class_id,
            &s.register_no,
            s.gender.as_str(),
            &s.parent_phone_number,
            &s.mentor,
            &s.id,
        ),
    )?;
    Ok(())
}

/// `None` when the stored status is not one of the three known values.
fn record_from_row(r: &Row<'_>) -> rusqlite::Result<Option<LateRecord>> {
    let id: String = r.get(0)?;
    let gender_raw: Option<String> = r.get(4)?;
    let status_raw: String = r.get(11)?;
    let Some(status) = LateStatus::parse(&status_raw) else {
        log::warn!("skipping late record {}: unknown status {:?}", id, status_raw);
        return Ok(None);
    };
    Ok(Some(LateRecord {
        id,
        student_id: r.get::<_, Option<String>>(1)?.filter(|s| !s.trim().is_empty()),
        student_name: r.get(2)?,
        register_no: r.get(3)?,
        gender: gender_raw.as_deref().and_then(Gender::parse),
        department_name: r.get(5)?,
        class_name: r.get(6)?,
        date: r.get(7)?,
        time: r.get(8)?,
        timestamp: r.get(9)?,
        marked_by: r.get(10)?,
        status,
    }))
}

/// All readable records in insertion order; the engine decides presentation
/// order. Rows with an unknown status are skipped.
pub fn list_late_records(conn: &Connection) -> anyhow::Result<Vec<LateRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, student_name, register_no, gender, department_name, class_name,
                date, time, timestamp, marked_by, status
         FROM late_records
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().flatten().collect())
}

pub fn insert_late_record(conn: &Connection, rec: &LateRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO late_records(
            id, student_id, student_name, register_no, gender, department_name, class_name,
            date, time, timestamp, marked_by, status)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &rec.id,
            &rec.student_id,
            &rec.student_name,
            &rec.register_no,
            rec.gender.map(|g| g.as_str()),
            &rec.department_name,
            &rec.class_name,
            &rec.date,
            &rec.time,
            &rec.timestamp,
            &rec.marked_by,
            rec.status.as_str(),
        ),
    )?;
    Ok(())
}

/// Reference data plus every late record, loaded together for one engine run.
pub struct Snapshot {
    pub departments: Vec<Department>,
    pub classes: Vec<Class>,
    pub students: Vec<Student>,
    pub records: Vec<LateRecord>,
}

pub fn load_snapshot(conn: &Connection) -> anyhow::Result<Snapshot> {
    Ok(Snapshot {
        departments: list_departments(conn)?,
        classes: list_classes(conn)?,
        students: list_students(conn)?,
        records: list_late_records(conn)?,
    })
}

pub fn insert_department(conn: &Connection, d: &Department) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO departments(id, name) VALUES(?, ?)",
        (&d.id, &d.name),
    )?;
    Ok(())
}

pub fn insert_class(conn: &Connection, c: &Class) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO classes(id, department_id, name) VALUES(?, ?, ?)",
        (&c.id, &c.department_id, &c.name),
    )?;
    Ok(())
}

/// Late records that name the student are left in place.
pub fn delete_student(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    Ok(n > 0)
}

pub fn delete_late_records(conn: &mut Connection, ids: &[String]) -> anyhow::Result<usize> {
    let tx = conn.transaction()?;
    let mut removed = 0;
    {
        let mut stmt = tx.prepare("DELETE FROM late_records WHERE id = ?")?;
        for id in ids {
            removed += stmt.execute([id])?;
        }
    }
    tx.commit()?;
    Ok(removed)
}

pub fn delete_all_late_records(conn: &Connection) -> anyhow::Result<usize> {
    Ok(conn.execute("DELETE FROM late_records", [])?)
}
