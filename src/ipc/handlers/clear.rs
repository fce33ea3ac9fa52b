use crate::commit;
use crate::conflict::EngineError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{LabGroup, ScopeKey};
use crate::slotkey::{day_index_from_value, SlotKey};
use rusqlite::Connection;
use serde_json::{json, Value as JsonValue};

fn day_index(params: &JsonValue) -> Result<i64, EngineError> {
    day_index_from_value(params.get("dayIndex"))
        .ok_or_else(|| EngineError::bad_params("dayIndex must be between 0 and 6"))
}

fn slot_id(params: &JsonValue) -> Result<SlotKey, EngineError> {
    params
        .get("slotId")
        .and_then(SlotKey::from_value)
        .ok_or_else(|| EngineError::bad_params("missing slotId"))
}

fn required_str(params: &JsonValue, key: &str) -> Result<String, EngineError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| EngineError::bad_params(format!("missing {}", key)))
}

fn routine_clear(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let scope = ScopeKey::parse(params)?;
    let day = day_index(params)?;
    let slot = slot_id(params)?;
    let lab_group = match params.get("labGroup").and_then(|v| v.as_str()) {
        Some(raw) => Some(LabGroup::parse(raw).ok_or_else(|| {
            EngineError::bad_params("labGroup must be A, B, C, D or ALL")
        })?),
        None => None,
    };
    let outcome = commit::clear_cell(conn, &scope, day, &slot, lab_group)?;
    Ok(json!({ "deletedCount": outcome.deleted_count }))
}

fn routine_clear_group(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let group_id = required_str(params, "groupId")?;
    let outcome = commit::clear_group(conn, &group_id)?;
    Ok(json!({
        "deletedCount": outcome.deleted_count,
        "affectedTeacherIds": outcome.teacher_ids,
        "affectedRoomIds": outcome.room_ids,
    }))
}

fn routine_clear_scope(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let scope = ScopeKey::parse(params)?;
    let outcome = commit::clear_scope(conn, &scope)?;
    Ok(json!({
        "deletedCount": outcome.deleted_count,
        "affectedTeacherIds": outcome.teacher_ids,
    }))
}

fn handle_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_clear(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_clear_group(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_clear_group(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_clear_scope(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_clear_scope(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "routine.clear" => Some(handle_clear(state, req)),
        "routine.clearGroup" => Some(handle_clear_group(state, req)),
        "routine.clearScope" => Some(handle_clear_scope(state, req)),
        _ => None,
    }
}
