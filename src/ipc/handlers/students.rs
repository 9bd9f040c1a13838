use crate::assign;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, db_err_table, get_opt_str, get_required_i64, get_required_str, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, OptionalExtension};
use serde_json::json;

fn row_to_json(row: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": row.get::<_, i64>(0)?,
        "firstName": row.get::<_, String>(1)?,
        "lastName": row.get::<_, String>(2)?,
        "email": row.get::<_, String>(3)?,
        "level": row.get::<_, String>(4)?,
        "phoneNumber": row.get::<_, Option<String>>(5)?,
    }))
}

const SELECT_COLS: &str = "id, first_name, last_name, email, level, phone_number";

fn require_email(email: &str) -> Result<(), HandlerErr> {
    if !email.contains('@') {
        return Err(HandlerErr::bad_params(
            "email does not look like an address",
        ));
    }
    Ok(())
}

fn create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;

    let first_name = get_required_str(params, "firstName")?;
    let last_name = get_required_str(params, "lastName")?;
    let email = get_required_str(params, "email")?;
    let level = get_required_str(params, "level")?;
    require_email(&email)?;
    if !assign::is_student_level(&level) {
        return Err(HandlerErr::bad_params(format!(
            "invalid level: {}",
            level
        )));
    }
    let phone_number = get_opt_str(params, "phoneNumber");

    conn.execute(
        "INSERT INTO students(first_name, last_name, email, level, phone_number, updated_at)
         VALUES(?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &first_name,
            &last_name,
            &email,
            &level,
            phone_number.as_deref(),
        ),
    )
    .map_err(|e| db_err_table("db_insert_failed", e, "students"))?;

    Ok(json!({ "studentId": conn.last_insert_rowid() }))
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let level = get_opt_str(params, "level");

    let students = match level {
        Some(level) => {
            let sql = format!(
                "SELECT {} FROM students WHERE level = ? ORDER BY id",
                SELECT_COLS
            );
            let mut stmt = conn.prepare(&sql).map_err(|e| db_err("db_query_failed", e))?;
            stmt.query_map([&level], |row| row_to_json(row))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| db_err("db_query_failed", e))?
        }
        None => {
            let sql = format!("SELECT {} FROM students ORDER BY id", SELECT_COLS);
            let mut stmt = conn.prepare(&sql).map_err(|e| db_err("db_query_failed", e))?;
            stmt.query_map([], |row| row_to_json(row))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| db_err("db_query_failed", e))?
        }
    };

    Ok(json!({ "students": students }))
}

fn get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let student_id = get_required_i64(params, "studentId")?;

    let sql = format!("SELECT {} FROM students WHERE id = ?", SELECT_COLS);
    let student = conn
        .query_row(&sql, [student_id], |row| row_to_json(row))
        .optional()
        .map_err(|e| db_err("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::not_found(format!("student with id={} not found", student_id))
        })?;

    Ok(json!({ "student": student }))
}

/// Students eligible for a given internship type, the picker the assignment
/// form uses before creating an internship.
fn list_by_type(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let kind = get_required_str(params, "type")?;

    let levels = assign::accepted_levels(&kind);
    if levels.is_empty() {
        return Err(HandlerErr::bad_params(
            "invalid internship type, must be one of: initiation, perfectionnement, pfe",
        ));
    }

    let placeholders = vec!["?"; levels.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM students WHERE level IN ({}) ORDER BY id",
        SELECT_COLS, placeholders
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| db_err("db_query_failed", e))?;
    let students = stmt
        .query_map(
            params_from_iter(levels.iter().map(|l| Value::Text((*l).to_string()))),
            |row| row_to_json(row),
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", e))?;

    Ok(json!({ "students": students }))
}

fn update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let student_id = get_required_i64(params, "studentId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing/invalid patch"));
    };

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    for (key, column) in [
        ("firstName", "first_name"),
        ("lastName", "last_name"),
        ("email", "email"),
        ("level", "level"),
        ("phoneNumber", "phone_number"),
    ] {
        if let Some(v) = patch.get(key) {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!(
                    "patch.{} must be a string",
                    key
                )));
            };
            let s = s.trim().to_string();
            match key {
                "email" => require_email(&s)?,
                "level" => {
                    if !assign::is_student_level(&s) {
                        return Err(HandlerErr::bad_params(format!("invalid level: {}", s)));
                    }
                }
                "phoneNumber" => {}
                _ => {
                    if s.is_empty() {
                        return Err(HandlerErr::bad_params(format!(
                            "{} must not be empty",
                            key
                        )));
                    }
                }
            }
            set_parts.push(format!("{} = ?", column));
            bind_values.push(Value::Text(s));
        }
    }

    if set_parts.is_empty() {
        return Err(HandlerErr::bad_params("empty patch"));
    }

    set_parts.push("updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')".into());
    let sql = format!("UPDATE students SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(Value::Integer(student_id));
    let affected = conn
        .execute(&sql, params_from_iter(bind_values))
        .map_err(|e| db_err_table("db_update_failed", e, "students"))?;
    if affected == 0 {
        return Err(HandlerErr::not_found(format!(
            "student with id={} not found",
            student_id
        )));
    }

    Ok(json!({ "studentId": student_id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let student_id = get_required_i64(params, "studentId")?;

    // Placements reference the student; deleting would orphan them.
    let referenced: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM internships WHERE student_id = ?",
            [student_id],
            |row| row.get(0),
        )
        .map_err(|e| db_err("db_query_failed", e))?;
    if referenced > 0 {
        return Err(HandlerErr::conflict(format!(
            "student with id={} still has {} internship(s)",
            student_id, referenced
        )));
    }

    let affected = conn
        .execute("DELETE FROM students WHERE id = ?", [student_id])
        .map_err(|e| db_err_table("db_delete_failed", e, "students"))?;
    if affected == 0 {
        return Err(HandlerErr::not_found(format!(
            "student with id={} not found",
            student_id
        )));
    }

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.create" => create(state, &req.params),
        "students.list" => list(state, &req.params),
        "students.get" => get(state, &req.params),
        "students.listByType" => list_by_type(state, &req.params),
        "students.update" => update(state, &req.params),
        "students.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
