use crate::assign;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, db_err_table, get_opt_str, get_required_i64, get_required_str, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

fn require_iso_date(value: &str, key: &str) -> Result<(), HandlerErr> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| HandlerErr::bad_params(format!("{} must be an ISO date (YYYY-MM-DD)", key)))
}

/// Teacher ids supplied by the caller, when present as a non-empty array.
/// Anything else (absent, null, non-array, empty array) falls back to
/// random assignment, matching the create contract.
fn explicit_teacher_ids(params: &serde_json::Value) -> Result<Option<Vec<i64>>, HandlerErr> {
    let Some(arr) = params.get("teacherIds").and_then(|v| v.as_array()) else {
        return Ok(None);
    };
    if arr.is_empty() {
        return Ok(None);
    }
    let mut ids = Vec::with_capacity(arr.len());
    for v in arr {
        let id = v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params("teacherIds must be an array of teacher ids"))?;
        ids.push(id);
    }
    Ok(Some(ids))
}

/// Keep only ids that resolve to stored teachers; unmatched ids are
/// dropped silently, which is the defined association behavior.
fn resolve_teacher_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<i64>, HandlerErr> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT id FROM teachers WHERE id IN ({}) ORDER BY id",
        placeholders
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", e))?;
    stmt.query_map(
        params_from_iter(ids.iter().map(|id| Value::Integer(*id))),
        |row| row.get::<_, i64>(0),
    )
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| db_err("db_query_failed", e))
}

fn teacher_pool(conn: &Connection) -> Result<Vec<i64>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id FROM teachers ORDER BY id")
        .map_err(|e| db_err("db_query_failed", e))?;
    stmt.query_map([], |row| row.get::<_, i64>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", e))
}

fn student_json(conn: &Connection, student_id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        "SELECT id, first_name, last_name, email, level, phone_number
         FROM students WHERE id = ?",
        [student_id],
        |row| {
            Ok(json!({
                "id": row.get::<_, i64>(0)?,
                "firstName": row.get::<_, String>(1)?,
                "lastName": row.get::<_, String>(2)?,
                "email": row.get::<_, String>(3)?,
                "level": row.get::<_, String>(4)?,
                "phoneNumber": row.get::<_, Option<String>>(5)?,
            }))
        },
    )
    .optional()
    .map_err(|e| db_err("db_query_failed", e))
}

fn teachers_json(conn: &Connection, internship_id: i64) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.first_name, t.last_name, t.email, t.department, t.specialty
             FROM teachers t
             JOIN internship_teachers it ON it.teacher_id = t.id
             WHERE it.internship_id = ?
             ORDER BY t.id",
        )
        .map_err(|e| db_err("db_query_failed", e))?;
    stmt.query_map([internship_id], |row| {
        Ok(json!({
            "id": row.get::<_, i64>(0)?,
            "firstName": row.get::<_, String>(1)?,
            "lastName": row.get::<_, String>(2)?,
            "email": row.get::<_, String>(3)?,
            "department": row.get::<_, Option<String>>(4)?,
            "specialty": row.get::<_, Option<String>>(5)?,
        }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| db_err("db_query_failed", e))
}

/// Internship record enriched with its student and supervising teachers,
/// the shape every read path returns.
fn internship_json(
    conn: &Connection,
    internship_id: i64,
) -> Result<Option<serde_json::Value>, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT id, title, company, type, start_date, end_date, room, description, student_id
             FROM internships WHERE id = ?",
            [internship_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            },
        )
        .optional()
        .map_err(|e| db_err("db_query_failed", e))?;

    let Some((id, title, company, kind, start_date, end_date, room, description, student_id)) = row
    else {
        return Ok(None);
    };

    let student = student_json(conn, student_id)?;
    let teachers = teachers_json(conn, id)?;

    Ok(Some(json!({
        "id": id,
        "title": title,
        "company": company,
        "type": kind,
        "startDate": start_date,
        "endDate": end_date,
        "room": room,
        "description": description,
        "studentId": student_id,
        "student": student,
        "teachers": teachers,
    })))
}

fn list_internships(
    conn: &Connection,
    type_filter: Option<&str>,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let ids: Vec<i64> = match type_filter {
        Some(kind) => {
            let mut stmt = conn
                .prepare("SELECT id FROM internships WHERE type = ? ORDER BY id")
                .map_err(|e| db_err("db_query_failed", e))?;
            stmt.query_map([kind], |row| row.get(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| db_err("db_query_failed", e))?
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT id FROM internships ORDER BY id")
                .map_err(|e| db_err("db_query_failed", e))?;
            stmt.query_map([], |row| row.get(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| db_err("db_query_failed", e))?
        }
    };

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(v) = internship_json(conn, id)? {
            out.push(v);
        }
    }
    Ok(out)
}

fn create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;

    // Required fields first, before any lookup.
    let title = get_required_str(params, "title")?;
    let company = get_required_str(params, "company")?;
    let kind = get_required_str(params, "type")?;
    let start_date = get_required_str(params, "startDate")?;
    let end_date = get_required_str(params, "endDate")?;
    let student_id = get_required_i64(params, "studentId")?;
    require_iso_date(&start_date, "startDate")?;
    require_iso_date(&end_date, "endDate")?;
    let description = get_opt_str(params, "description");

    let level: Option<String> = conn
        .query_row(
            "SELECT level FROM students WHERE id = ?",
            [student_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| db_err("db_query_failed", e))?;
    let Some(level) = level else {
        return Err(HandlerErr::not_found(format!(
            "student with id={} not found",
            student_id
        )));
    };

    if !assign::level_matches_type(&level, &kind) {
        return Err(HandlerErr::validation(format!(
            "student level ({}) does not match internship type ({})",
            level, kind
        )));
    }

    let teacher_ids = match explicit_teacher_ids(params)? {
        Some(ids) => ids,
        None => {
            let pool = teacher_pool(conn)?;
            assign::pick_supervisors(&pool, &mut rand::rng()).ok_or_else(|| {
                HandlerErr::validation("not enough teachers available for random assignment")
            })?
        }
    };

    let room = get_opt_str(params, "room")
        .unwrap_or_else(|| assign::pick_room(&mut rand::rng()).to_string());

    let associated = resolve_teacher_ids(conn, &teacher_ids)?;

    // Row and associations land together or not at all.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_err("db_tx_failed", e))?;

    tx.execute(
        "INSERT INTO internships(
           title, company, type, start_date, end_date, room, description, student_id, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &title,
            &company,
            &kind,
            &start_date,
            &end_date,
            &room,
            description.as_deref(),
            student_id,
        ),
    )
    .map_err(|e| db_err_table("db_insert_failed", e, "internships"))?;
    let internship_id = tx.last_insert_rowid();

    for teacher_id in &associated {
        tx.execute(
            "INSERT INTO internship_teachers(internship_id, teacher_id) VALUES(?, ?)",
            (internship_id, teacher_id),
        )
        .map_err(|e| db_err_table("db_insert_failed", e, "internship_teachers"))?;
    }

    tx.commit().map_err(|e| db_err("db_commit_failed", e))?;

    // Re-read with associations so the caller gets consistent referential
    // data, not the bare insert.
    let internship = internship_json(conn, internship_id)?.ok_or_else(|| {
        HandlerErr::not_found(format!("internship with id={} not found", internship_id))
    })?;
    Ok(json!({ "internship": internship }))
}

fn get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let internship_id = get_required_i64(params, "internshipId")?;
    let internship = internship_json(conn, internship_id)?.ok_or_else(|| {
        HandlerErr::not_found(format!("internship with id={} not found", internship_id))
    })?;
    Ok(json!({ "internship": internship }))
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let type_filter = get_opt_str(params, "type");
    let internships = list_internships(conn, type_filter.as_deref())?;
    Ok(json!({ "internships": internships }))
}

fn list_by_type(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let kind = get_required_str(params, "type")?;
    if !assign::is_internship_type(&kind) {
        return Err(HandlerErr::bad_params(
            "invalid internship type, must be one of: initiation, perfectionnement, pfe",
        ));
    }
    let internships = list_internships(conn, Some(&kind))?;
    Ok(json!({ "internships": internships }))
}

fn update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let internship_id = get_required_i64(params, "internshipId")?;

    let patch = params.get("patch").and_then(|v| v.as_object());
    let teacher_ids = params.get("teacherIds").and_then(|v| v.as_array());
    if patch.is_none() && teacher_ids.is_none() {
        return Err(HandlerErr::bad_params("nothing to update"));
    }

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(patch) = patch {
        for (key, column) in [
            ("title", "title"),
            ("company", "company"),
            ("type", "type"),
            ("startDate", "start_date"),
            ("endDate", "end_date"),
            ("room", "room"),
            ("description", "description"),
        ] {
            if let Some(v) = patch.get(key) {
                let Some(s) = v.as_str() else {
                    return Err(HandlerErr::bad_params(format!(
                        "patch.{} must be a string",
                        key
                    )));
                };
                if key == "startDate" || key == "endDate" {
                    require_iso_date(s, key)?;
                }
                set_parts.push(format!("{} = ?", column));
                bind_values.push(Value::Text(s.trim().to_string()));
            }
        }
        if let Some(v) = patch.get("studentId") {
            let Some(sid) = v.as_i64() else {
                return Err(HandlerErr::bad_params("patch.studentId must be an id"));
            };
            set_parts.push("student_id = ?".into());
            bind_values.push(Value::Integer(sid));
        }
    }

    // No re-validation of the level/type mapping here; updates apply the
    // requested fields as-is.
    if !set_parts.is_empty() {
        set_parts.push("updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')".into());
        let sql = format!(
            "UPDATE internships SET {} WHERE id = ?",
            set_parts.join(", ")
        );
        bind_values.push(Value::Integer(internship_id));
        let affected = conn
            .execute(&sql, params_from_iter(bind_values))
            .map_err(|e| db_err_table("db_update_failed", e, "internships"))?;
        if affected == 0 {
            // Zero rows affected is indistinguishable from a missing record.
            return Err(HandlerErr::not_found(format!(
                "internship with id={} not found",
                internship_id
            )));
        }
    } else {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM internships WHERE id = ?",
                [internship_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_err("db_query_failed", e))?;
        if exists.is_none() {
            return Err(HandlerErr::not_found(format!(
                "internship with id={} not found",
                internship_id
            )));
        }
    }

    if let Some(arr) = teacher_ids {
        let mut requested = Vec::with_capacity(arr.len());
        for v in arr {
            let id = v.as_i64().ok_or_else(|| {
                HandlerErr::bad_params("teacherIds must be an array of teacher ids")
            })?;
            requested.push(id);
        }
        let resolved = resolve_teacher_ids(conn, &requested)?;

        // Full replacement of the association set, not a merge.
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| db_err("db_tx_failed", e))?;
        tx.execute(
            "DELETE FROM internship_teachers WHERE internship_id = ?",
            [internship_id],
        )
        .map_err(|e| db_err_table("db_delete_failed", e, "internship_teachers"))?;
        for teacher_id in &resolved {
            tx.execute(
                "INSERT INTO internship_teachers(internship_id, teacher_id) VALUES(?, ?)",
                (internship_id, teacher_id),
            )
            .map_err(|e| db_err_table("db_insert_failed", e, "internship_teachers"))?;
        }
        tx.commit().map_err(|e| db_err("db_commit_failed", e))?;
    }

    Ok(json!({ "internshipId": internship_id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(&state.db)?;
    let internship_id = get_required_i64(params, "internshipId")?;

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM internships WHERE id = ?",
            [internship_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| db_err("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::not_found(format!(
            "internship with id={} not found",
            internship_id
        )));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_err("db_tx_failed", e))?;
    tx.execute(
        "DELETE FROM internship_teachers WHERE internship_id = ?",
        [internship_id],
    )
    .map_err(|e| db_err_table("db_delete_failed", e, "internship_teachers"))?;
    tx.execute("DELETE FROM internships WHERE id = ?", [internship_id])
        .map_err(|e| db_err_table("db_delete_failed", e, "internships"))?;
    tx.commit().map_err(|e| db_err("db_commit_failed", e))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "internships.create" => create(state, &req.params),
        "internships.get" => get(state, &req.params),
        "internships.list" => list(state, &req.params),
        "internships.listByType" => list_by_type(state, &req.params),
        "internships.update" => update(state, &req.params),
        "internships.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
