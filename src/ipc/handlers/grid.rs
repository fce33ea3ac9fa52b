use crate::conflict::EngineError;
use crate::grid::{build_grid, room_schedule, teacher_schedule};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::ScopeKey;
use rusqlite::Connection;
use serde_json::Value as JsonValue;

fn required_str(params: &JsonValue, key: &str) -> Result<String, EngineError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| EngineError::bad_params(format!("missing {}", key)))
}

fn routine_grid(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let scope = ScopeKey::parse(params)?;
    build_grid(conn, &scope)
}

fn routine_teacher_schedule(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let teacher_id = required_str(params, "teacherId")?;
    teacher_schedule(conn, &teacher_id)
}

fn routine_room_schedule(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let room_id = required_str(params, "roomId")?;
    room_schedule(conn, &room_id)
}

fn handle_grid(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_grid(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_teacher_schedule(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_teacher_schedule(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_room_schedule(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_room_schedule(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "routine.grid" => Some(handle_grid(state, req)),
        "routine.teacherSchedule" => Some(handle_teacher_schedule(state, req)),
        "routine.roomSchedule" => Some(handle_room_schedule(state, req)),
        _ => None,
    }
}
