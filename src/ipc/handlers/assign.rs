use crate::commit;
use crate::conflict::EngineError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{ClassPayload, ScopeKey};
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

fn slot_id_list(params: &JsonValue) -> Result<Vec<SlotKey>, EngineError> {
    let Some(arr) = params.get("slotIds").and_then(|v| v.as_array()) else {
        return Err(EngineError::bad_params("missing slotIds"));
    };
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(key) = SlotKey::from_value(v) else {
            return Err(EngineError::bad_params(
                "slotIds must contain string or number slot ids",
            ));
        };
        out.push(key);
    }
    Ok(out)
}

fn scope_list(params: &JsonValue) -> Result<Vec<ScopeKey>, EngineError> {
    let Some(arr) = params.get("scopes").and_then(|v| v.as_array()) else {
        return Err(EngineError::bad_params("missing scopes"));
    };
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        out.push(ScopeKey::parse(v)?);
    }
    Ok(out)
}

fn entry_views(entries: &[crate::model::RoutineEntry]) -> Vec<JsonValue> {
    entries.iter().map(|e| e.view()).collect()
}

fn routine_assign(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let scope = ScopeKey::parse(params)?;
    let day = day_index(params)?;
    let slot = slot_id(params)?;
    let payload = ClassPayload::parse(params.get("payload"))?;
    let entry = commit::assign_single(conn, &scope, day, &slot, &payload)?;
    Ok(json!({ "entry": entry.view() }))
}

fn routine_assign_spanned(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let scope = ScopeKey::parse(params)?;
    let day = day_index(params)?;
    let slots = slot_id_list(params)?;
    let payload = ClassPayload::parse(params.get("payload"))?;
    let outcome = commit::assign_spanned(conn, &scope, day, &slots, &payload)?;
    Ok(json!({
        "spanId": outcome.span_id,
        "entries": entry_views(&outcome.entries),
    }))
}

fn routine_assign_elective(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let scopes = scope_list(params)?;
    let day = day_index(params)?;
    let slot = slot_id(params)?;
    let payload = ClassPayload::parse(params.get("payload"))?;
    let outcome = commit::assign_elective(conn, &scopes, day, &slot, &payload)?;
    Ok(json!({
        "electiveGroupId": outcome.elective_group_id,
        "entries": entry_views(&outcome.entries),
    }))
}

/// Dry-run of the matching assign shape, decided by the params: `slotIds`
/// means spanned, `scopes` means elective, otherwise single.
fn routine_check(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let day = day_index(params)?;
    let payload = ClassPayload::parse(params.get("payload"))?;
    if params.get("slotIds").is_some() {
        let scope = ScopeKey::parse(params)?;
        let slots = slot_id_list(params)?;
        commit::check_spanned(conn, &scope, day, &slots, &payload)?;
    } else if params.get("scopes").is_some() {
        let scopes = scope_list(params)?;
        let slot = slot_id(params)?;
        commit::check_elective(conn, &scopes, day, &slot, &payload)?;
    } else {
        let scope = ScopeKey::parse(params)?;
        let slot = slot_id(params)?;
        commit::check_single(conn, &scope, day, &slot, &payload)?;
    }
    Ok(json!({ "ok": true }))
}

fn handle_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_assign(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_assign_spanned(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_assign_spanned(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_assign_elective(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_assign_elective(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_check(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match routine_check(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "routine.assign" => Some(handle_assign(state, req)),
        "routine.assignSpanned" => Some(handle_assign_spanned(state, req)),
        "routine.assignElective" => Some(handle_assign_elective(state, req)),
        "routine.check" => Some(handle_check(state, req)),
        _ => None,
    }
}
