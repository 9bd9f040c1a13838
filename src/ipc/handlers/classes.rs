use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, db_err_table, get_opt_str, get_required_i64, get_required_str, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, OptionalExtension};
use serde_json::json;

/// Year codes a class can carry; the student-level enumeration combines
/// one of these with a specialization.
const CLASS_LEVELS: [&str; 3] = ["1ere", "2eme", "3eme"];
const SPECIALIZATIONS: [&str; 3] = ["TI", "DSI", "MDW"];

fn row_to_json(row: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": row.get::<_, i64>(0)?,
        "name": row.get::<_, String>(1)?,
        "level": row.get::<_, String>(2)?,
        "specialization": row.get::<_, Option<String>>(3)?,
        "description": row.get::<_, Option<String>>(4)?,
    }))
}

const SELECT_COLS: &str = "id, name, level, specialization, description";

fn create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;

    let name = get_required_str(params, "name")?;
    let level = get_required_str(params, "level")?;
    if !CLASS_LEVELS.contains(&level.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "invalid class level: {}",
            level
        )));
    }
    let specialization = get_opt_str(params, "specialization");
    if let Some(s) = &specialization {
        if !SPECIALIZATIONS.contains(&s.as_str()) {
            return Err(HandlerErr::bad_params(format!(
                "invalid specialization: {}",
                s
            )));
        }
    }
    let description = get_opt_str(params, "description");

    conn.execute(
        "INSERT INTO classes(name, level, specialization, description) VALUES(?, ?, ?, ?)",
        (
            &name,
            &level,
            specialization.as_deref(),
            description.as_deref(),
        ),
    )
    .map_err(|e| db_err_table("db_insert_failed", e, "classes"))?;

    Ok(json!({ "classId": conn.last_insert_rowid() }))
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let level = get_opt_str(params, "level");

    let classes = match level {
        Some(level) => {
            let sql = format!(
                "SELECT {} FROM classes WHERE level = ? ORDER BY name",
                SELECT_COLS
            );
            let mut stmt = conn.prepare(&sql).map_err(|e| db_err("db_query_failed", e))?;
            stmt.query_map([&level], |row| row_to_json(row))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| db_err("db_query_failed", e))?
        }
        None => {
            let sql = format!("SELECT {} FROM classes ORDER BY name", SELECT_COLS);
            let mut stmt = conn.prepare(&sql).map_err(|e| db_err("db_query_failed", e))?;
            stmt.query_map([], |row| row_to_json(row))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| db_err("db_query_failed", e))?
        }
    };

    Ok(json!({ "classes": classes }))
}

fn get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let class_id = get_required_i64(params, "classId")?;

    let sql = format!("SELECT {} FROM classes WHERE id = ?", SELECT_COLS);
    let class = conn
        .query_row(&sql, [class_id], |row| row_to_json(row))
        .optional()
        .map_err(|e| db_err("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found(format!("class with id={} not found", class_id)))?;

    Ok(json!({ "class": class }))
}

fn update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let class_id = get_required_i64(params, "classId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing/invalid patch"));
    };

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    for (key, column) in [
        ("name", "name"),
        ("level", "level"),
        ("specialization", "specialization"),
        ("description", "description"),
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
                "name" => {
                    if s.is_empty() {
                        return Err(HandlerErr::bad_params("name must not be empty"));
                    }
                }
                "level" => {
                    if !CLASS_LEVELS.contains(&s.as_str()) {
                        return Err(HandlerErr::bad_params(format!(
                            "invalid class level: {}",
                            s
                        )));
                    }
                }
                "specialization" => {
                    if !s.is_empty() && !SPECIALIZATIONS.contains(&s.as_str()) {
                        return Err(HandlerErr::bad_params(format!(
                            "invalid specialization: {}",
                            s
                        )));
                    }
                }
                _ => {}
            }
            set_parts.push(format!("{} = ?", column));
            bind_values.push(Value::Text(s));
        }
    }

    if set_parts.is_empty() {
        return Err(HandlerErr::bad_params("empty patch"));
    }

    let sql = format!("UPDATE classes SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(Value::Integer(class_id));
    let affected = conn
        .execute(&sql, params_from_iter(bind_values))
        .map_err(|e| db_err_table("db_update_failed", e, "classes"))?;
    if affected == 0 {
        return Err(HandlerErr::not_found(format!(
            "class with id={} not found",
            class_id
        )));
    }

    Ok(json!({ "classId": class_id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let class_id = get_required_i64(params, "classId")?;

    let affected = conn
        .execute("DELETE FROM classes WHERE id = ?", [class_id])
        .map_err(|e| db_err_table("db_delete_failed", e, "classes"))?;
    if affected == 0 {
        return Err(HandlerErr::not_found(format!(
            "class with id={} not found",
            class_id
        )));
    }

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.create" => create(state, &req.params),
        "classes.list" => list(state, &req.params),
        "classes.get" => get(state, &req.params),
        "classes.update" => update(state, &req.params),
        "classes.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
