use crate::commit;
use crate::conflict::{self, EngineError, SlotRow};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::slotkey::SlotKey;
use chrono::NaiveTime;
use log::info;
use rusqlite::{params, Connection};
use serde_json::{json, Value as JsonValue};

fn parse_time(raw: Option<&JsonValue>, what: &str) -> Result<NaiveTime, EngineError> {
    let Some(s) = raw
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return Err(EngineError::bad_params(format!("missing {}", what)));
    };
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| EngineError::bad_params(format!("{} must be HH:MM", what)))
}

fn parse_slot_item(item: &JsonValue, index: usize) -> Result<SlotRow, EngineError> {
    let Some(obj) = item.as_object() else {
        return Err(EngineError::bad_params(format!(
            "slots[{}] must be an object",
            index
        )));
    };
    let slot_key = obj.get("slotId").and_then(SlotKey::from_value).ok_or_else(|| {
        EngineError::bad_params(format!("slots[{}].slotId is required", index))
    })?;
    let day_type = obj
        .get("dayType")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("ALL")
        .to_string();
    let start = parse_time(obj.get("startTime"), &format!("slots[{}].startTime", index))?;
    let end = parse_time(obj.get("endTime"), &format!("slots[{}].endTime", index))?;
    if end <= start {
        return Err(EngineError::bad_params(format!(
            "slots[{}].endTime must be after startTime",
            index
        )));
    }
    let sort_order = obj.get("sortOrder").and_then(|v| v.as_i64()).ok_or_else(|| {
        EngineError::bad_params(format!("slots[{}].sortOrder must be a number", index))
    })?;
    let is_break = match obj.get("isBreak") {
        None => false,
        Some(v) if v.is_null() => false,
        Some(v) => v.as_bool().ok_or_else(|| {
            EngineError::bad_params(format!("slots[{}].isBreak must be boolean", index))
        })?,
    };
    Ok(SlotRow {
        slot_key: slot_key.as_str().to_string(),
        day_type,
        start_time: start.format("%H:%M").to_string(),
        end_time: end.format("%H:%M").to_string(),
        sort_order,
        is_break,
    })
}

/// Swap in a whole new catalog. Refused when any committed entry references
/// a slot id the new catalog no longer carries.
fn timeslots_replace(conn: &Connection, params: &JsonValue) -> Result<JsonValue, EngineError> {
    let Some(items) = params.get("slots").and_then(|v| v.as_array()) else {
        return Err(EngineError::bad_params("missing slots"));
    };
    let mut rows: Vec<SlotRow> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let row = parse_slot_item(item, i)?;
        if rows.iter().any(|r| r.slot_key == row.slot_key) {
            return Err(EngineError::with_details(
                "bad_params",
                format!("duplicate slot id {}", row.slot_key),
                json!({ "slotId": row.slot_key }),
            ));
        }
        if rows
            .iter()
            .any(|r| r.day_type == row.day_type && r.sort_order == row.sort_order)
        {
            return Err(EngineError::with_details(
                "bad_params",
                format!(
                    "duplicate sort order {} within day type {}",
                    row.sort_order, row.day_type
                ),
                json!({ "dayType": row.day_type, "sortOrder": row.sort_order }),
            ));
        }
        rows.push(row);
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::db("db_tx_failed", e))?;
    let replaced_at = commit::now_ts();
    let write = (|| -> Result<(), EngineError> {
        // The orphan check reads inside the swap's own transaction, so a
        // concurrent assign cannot slip an entry onto a vanishing slot id
        // between check and write.
        let mut stmt = tx
            .prepare("SELECT DISTINCT slot_key FROM routine_slots")
            .map_err(|e| EngineError::db("db_query_failed", e))?;
        let referenced: Vec<String> = stmt
            .query_map([], |r| r.get(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| EngineError::db("db_query_failed", e))?;
        drop(stmt);
        let missing: Vec<&str> = referenced
            .iter()
            .filter(|key| !rows.iter().any(|r| &r.slot_key == *key))
            .map(|key| key.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::with_details(
                "invalid_slot",
                "committed entries reference slot ids absent from the new catalog",
                json!({ "slotIds": missing }),
            ));
        }
        tx.execute("DELETE FROM time_slots", [])
            .map_err(|e| EngineError::db("db_delete_failed", e))?;
        for r in &rows {
            tx.execute(
                "INSERT INTO time_slots(slot_key, day_type, start_time, end_time, sort_order, is_break)
                 VALUES(?, ?, ?, ?, ?, ?)",
                params![
                    r.slot_key,
                    r.day_type,
                    r.start_time,
                    r.end_time,
                    r.sort_order,
                    r.is_break as i64
                ],
            )
            .map_err(|e| EngineError::db("db_insert_failed", e))?;
        }
        db::settings_set_json(&tx, "timeslots.replacedAt", &json!(replaced_at))
            .map_err(|e| EngineError::new("db_update_failed", e.to_string()))?;
        Ok(())
    })();
    match write {
        Ok(()) => {
            tx.commit()
                .map_err(|e| EngineError::db("db_commit_failed", e))?;
            info!("time slot catalog replaced: {} slots", rows.len());
            Ok(json!({ "count": rows.len(), "replacedAt": replaced_at }))
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn timeslots_list(conn: &Connection) -> Result<JsonValue, EngineError> {
    let catalog = conflict::full_catalog(conn)?;
    let replaced_at = db::settings_get_json(conn, "timeslots.replacedAt")
        .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?;
    Ok(json!({
        "slots": catalog.iter().map(|s| s.view()).collect::<Vec<_>>(),
        "replacedAt": replaced_at,
    }))
}

fn handle_timeslots_replace(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match timeslots_replace(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_timeslots_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match timeslots_list(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timeslots.replace" => Some(handle_timeslots_replace(state, req)),
        "timeslots.list" => Some(handle_timeslots_list(state, req)),
        _ => None,
    }
}
