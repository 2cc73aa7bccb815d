use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::model::{format_timestamp, NewStudent, Student};

fn required(value: &str, field: &str) -> AppResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::Validation(format!("missing {}", field)));
    }
    Ok(v.to_string())
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        roll_number: r.get(2)?,
        email: r.get(3)?,
        department: r.get(4)?,
    })
}

const STUDENT_COLUMNS: &str = "id, name, roll_number, email, department";

/// Inserts a student and returns its generated id. Roll numbers are unique.
pub fn create_student(conn: &Connection, input: &NewStudent) -> AppResult<i64> {
    let name = required(&input.name, "name")?;
    let roll_number = required(&input.roll_number, "roll_number")?;
    let department = required(&input.department, "department")?;
    let email = input
        .email
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if let Some(e) = &email {
        if !e.contains('@') {
            return Err(AppError::Validation("email must contain @".to_string()));
        }
    }

    if find_by_roll(conn, &roll_number)?.is_some() {
        return Err(AppError::Conflict(format!(
            "roll number {} already exists",
            roll_number
        )));
    }

    conn.execute(
        "INSERT INTO students(name, roll_number, email, department, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &name,
            &roll_number,
            &email,
            &department,
            format_timestamp(&Utc::now()),
        ),
    )?;
    let id = conn.last_insert_rowid();
    info!(student_id = id, roll_number = %roll_number, "student created");
    Ok(id)
}

/// All students in insertion order.
pub fn list_students(conn: &Connection) -> AppResult<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY id",
        STUDENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, id: i64) -> AppResult<Option<Student>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
            [id],
            student_from_row,
        )
        .optional()?)
}

pub fn find_by_roll(conn: &Connection, roll_number: &str) -> AppResult<Option<Student>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM students WHERE roll_number = ?", STUDENT_COLUMNS),
            [roll_number.trim()],
            student_from_row,
        )
        .optional()?)
}

pub fn require_student(conn: &Connection, id: i64) -> AppResult<Student> {
    get_student(conn, id)?.ok_or_else(|| AppError::NotFound(format!("student {} not found", id)))
}
