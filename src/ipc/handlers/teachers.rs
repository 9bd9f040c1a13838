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
        "department": row.get::<_, Option<String>>(4)?,
        "specialty": row.get::<_, Option<String>>(5)?,
    }))
}

const SELECT_COLS: &str = "id, first_name, last_name, email, department, specialty";

fn create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;

    let first_name = get_required_str(params, "firstName")?;
    let last_name = get_required_str(params, "lastName")?;
    let email = get_required_str(params, "email")?;
    if !email.contains('@') {
        return Err(HandlerErr::bad_params(
            "email does not look like an address",
        ));
    }
    let department = get_opt_str(params, "department");
    let specialty = get_opt_str(params, "specialty");

    conn.execute(
        "INSERT INTO teachers(first_name, last_name, email, department, specialty, updated_at)
         VALUES(?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &first_name,
            &last_name,
            &email,
            department.as_deref(),
            specialty.as_deref(),
        ),
    )
    .map_err(|e| db_err_table("db_insert_failed", e, "teachers"))?;

    Ok(json!({ "teacherId": conn.last_insert_rowid() }))
}

fn list(state: &AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let sql = format!("SELECT {} FROM teachers ORDER BY id", SELECT_COLS);
    let mut stmt = conn.prepare(&sql).map_err(|e| db_err("db_query_failed", e))?;
    let teachers = stmt
        .query_map([], |row| row_to_json(row))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", e))?;
    Ok(json!({ "teachers": teachers }))
}

fn get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let teacher_id = get_required_i64(params, "teacherId")?;

    let sql = format!("SELECT {} FROM teachers WHERE id = ?", SELECT_COLS);
    let teacher = conn
        .query_row(&sql, [teacher_id], |row| row_to_json(row))
        .optional()
        .map_err(|e| db_err("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::not_found(format!("teacher with id={} not found", teacher_id))
        })?;

    Ok(json!({ "teacher": teacher }))
}

fn update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let teacher_id = get_required_i64(params, "teacherId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing/invalid patch"));
    };

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    for (key, column) in [
        ("firstName", "first_name"),
        ("lastName", "last_name"),
        ("email", "email"),
        ("department", "department"),
        ("specialty", "specialty"),
    ] {
        if let Some(v) = patch.get(key) {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!(
                    "patch.{} must be a string",
                    key
                )));
            };
            let s = s.trim().to_string();
            if (key == "firstName" || key == "lastName" || key == "email") && s.is_empty() {
                return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
            }
            if key == "email" && !s.contains('@') {
                return Err(HandlerErr::bad_params(
                    "email does not look like an address",
                ));
            }
            set_parts.push(format!("{} = ?", column));
            bind_values.push(Value::Text(s));
        }
    }

    if set_parts.is_empty() {
        return Err(HandlerErr::bad_params("empty patch"));
    }

    set_parts.push("updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')".into());
    let sql = format!("UPDATE teachers SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(Value::Integer(teacher_id));
    let affected = conn
        .execute(&sql, params_from_iter(bind_values))
        .map_err(|e| db_err_table("db_update_failed", e, "teachers"))?;
    if affected == 0 {
        return Err(HandlerErr::not_found(format!(
            "teacher with id={} not found",
            teacher_id
        )));
    }

    Ok(json!({ "teacherId": teacher_id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let teacher_id = get_required_i64(params, "teacherId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| db_err("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::not_found(format!(
            "teacher with id={} not found",
            teacher_id
        )));
    }

    // Supervision rows go with the teacher; internships keep any remaining
    // supervisors.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_err("db_tx_failed", e))?;
    tx.execute(
        "DELETE FROM internship_teachers WHERE teacher_id = ?",
        [teacher_id],
    )
    .map_err(|e| db_err_table("db_delete_failed", e, "internship_teachers"))?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [teacher_id])
        .map_err(|e| db_err_table("db_delete_failed", e, "teachers"))?;
    tx.commit().map_err(|e| db_err("db_commit_failed", e))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teachers.create" => create(state, &req.params),
        "teachers.list" => list(state, &req.params),
        "teachers.get" => get(state, &req.params),
        "teachers.update" => update(state, &req.params),
        "teachers.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
