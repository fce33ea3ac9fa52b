use crate::model::{RoutineEntry, ScopeKey, ENTRY_COLUMNS};
use crate::slotkey::SlotKey;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};

/// Typed engine failure surfaced to the protocol layer unchanged.
///
/// `teacher_conflict`, `room_conflict`, `break_slot`, `invalid_slot` and
/// `group_integrity` are the user-facing taxonomy; `bad_params` and the
/// `db_*_failed` family cover malformed input and infrastructure faults.
#[derive(Debug, Clone)]
pub struct EngineError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<JsonValue>,
}

impl EngineError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: &'static str, message: impl Into<String>, details: JsonValue) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn db(code: &'static str, e: rusqlite::Error) -> Self {
        Self::new(code, e.to_string())
    }
}

pub fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation)
}

/// One catalog row of the time grid reference.
#[derive(Debug, Clone)]
pub struct SlotRow {
    pub slot_key: String,
    pub day_type: String,
    pub start_time: String,
    pub end_time: String,
    pub sort_order: i64,
    pub is_break: bool,
}

impl SlotRow {
    pub fn view(&self) -> JsonValue {
        json!({
            "slotId": self.slot_key,
            "dayType": self.day_type,
            "startTime": self.start_time,
            "endTime": self.end_time,
            "sortOrder": self.sort_order,
            "isBreak": self.is_break,
        })
    }
}

fn slot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SlotRow> {
    Ok(SlotRow {
        slot_key: row.get(0)?,
        day_type: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        sort_order: row.get(4)?,
        is_break: row.get::<_, i64>(5)? != 0,
    })
}

const SLOT_COLUMNS: &str = "slot_key, day_type, start_time, end_time, sort_order, is_break";

pub fn resolve_slot(conn: &Connection, key: &SlotKey) -> Result<SlotRow, EngineError> {
    let sql = format!("SELECT {} FROM time_slots WHERE slot_key = ?", SLOT_COLUMNS);
    conn.query_row(&sql, [key.as_str()], slot_from_row)
        .optional()
        .map_err(|e| EngineError::db("db_query_failed", e))?
        .ok_or_else(|| {
            EngineError::with_details(
                "invalid_slot",
                format!("unknown time slot: {}", key),
                json!({ "slotId": key.as_str() }),
            )
        })
}

/// Resolve a slot that a class may actually occupy: known and not a break.
pub fn resolve_teaching_slot(conn: &Connection, key: &SlotKey) -> Result<SlotRow, EngineError> {
    let slot = resolve_slot(conn, key)?;
    if slot.is_break {
        return Err(EngineError::with_details(
            "break_slot",
            format!("slot {} is a break period", key),
            json!({ "slotId": slot.slot_key }),
        ));
    }
    Ok(slot)
}

/// Whole catalog in display order.
pub fn full_catalog(conn: &Connection) -> Result<Vec<SlotRow>, EngineError> {
    let sql = format!(
        "SELECT {} FROM time_slots ORDER BY day_type, sort_order",
        SLOT_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| EngineError::db("db_query_failed", e))?;
    stmt.query_map([], slot_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| EngineError::db("db_query_failed", e))
}

/// All committed rows in one cell of one scope's grid.
pub fn cell_entries(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slot_key: &str,
) -> Result<Vec<RoutineEntry>, EngineError> {
    let sql = format!(
        "SELECT {} FROM routine_slots
         WHERE program_code = ? AND semester = ? AND section = ?
           AND day_index = ? AND slot_key = ?
         ORDER BY created_at, id",
        ENTRY_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| EngineError::db("db_query_failed", e))?;
    stmt.query_map(
        (
            &scope.program_code,
            scope.semester,
            &scope.section,
            day_index,
            slot_key,
        ),
        RoutineEntry::from_row,
    )
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| EngineError::db("db_query_failed", e))
}

/// Every committed row of one scope, week order.
pub fn scope_entries(conn: &Connection, scope: &ScopeKey) -> Result<Vec<RoutineEntry>, EngineError> {
    let sql = format!(
        "SELECT {} FROM routine_slots
         WHERE program_code = ? AND semester = ? AND section = ?
         ORDER BY day_index, slot_key, created_at",
        ENTRY_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| EngineError::db("db_query_failed", e))?;
    stmt.query_map(
        (&scope.program_code, scope.semester, &scope.section),
        RoutineEntry::from_row,
    )
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| EngineError::db("db_query_failed", e))
}

fn teacher_claim_holder(
    conn: &Connection,
    day_index: i64,
    slot_key: &str,
    teacher_id: &str,
) -> Result<Option<String>, EngineError> {
    conn.query_row(
        "SELECT claim_group FROM teacher_claims
         WHERE day_index = ? AND slot_key = ? AND teacher_id = ?",
        (day_index, slot_key, teacher_id),
        |r| r.get(0),
    )
    .optional()
    .map_err(|e| EngineError::db("db_query_failed", e))
}

fn room_claim_holder(
    conn: &Connection,
    day_index: i64,
    slot_key: &str,
    room_id: &str,
) -> Result<Option<String>, EngineError> {
    conn.query_row(
        "SELECT claim_group FROM room_claims
         WHERE day_index = ? AND slot_key = ? AND room_id = ?",
        (day_index, slot_key, room_id),
        |r| r.get(0),
    )
    .optional()
    .map_err(|e| EngineError::db("db_query_failed", e))
}

/// Resolve a claim group back to its earliest committed row at a moment,
/// for conflict diagnostics. The group key is an entry id, a span id or an
/// elective group id; an elective group matches a row per section, so the
/// ordering keeps the reported row stable.
pub fn entry_for_claim(
    conn: &Connection,
    day_index: i64,
    slot_key: &str,
    claim_group: &str,
) -> Result<Option<RoutineEntry>, EngineError> {
    let sql = format!(
        "SELECT {} FROM routine_slots
         WHERE day_index = ? AND slot_key = ?
           AND (id = ?3 OR span_id = ?3 OR elective_group_id = ?3)
         ORDER BY created_at, rowid
         LIMIT 1",
        ENTRY_COLUMNS
    );
    conn.query_row(
        &sql,
        (day_index, slot_key, claim_group),
        RoutineEntry::from_row,
    )
    .optional()
    .map_err(|e| EngineError::db("db_query_failed", e))
}

fn booking_conflict(
    kind: &'static str,
    resource_id: &str,
    day_index: i64,
    slot_key: &str,
    hit: Option<&RoutineEntry>,
) -> EngineError {
    let (code, noun) = match kind {
        "teacher" => ("teacher_conflict", "teacher"),
        _ => ("room_conflict", "room"),
    };
    let message = match hit {
        Some(entry) => format!(
            "{} {} is already booked at day {}, slot {} ({} in {} for {})",
            noun,
            resource_id,
            day_index,
            slot_key,
            entry.subject_id,
            entry.room_id,
            entry.scope().label()
        ),
        None => format!(
            "{} {} is already booked at day {}, slot {}",
            noun, resource_id, day_index, slot_key
        ),
    };
    EngineError::with_details(
        code,
        message,
        json!({
            "kind": kind,
            "resourceId": resource_id,
            "dayIndex": day_index,
            "slotId": slot_key,
            "conflictingEntry": hit.map(|e| e.view()),
        }),
    )
}

/// Validate one candidate's resource demands at a moment against the
/// conflict index. Teachers are checked in submission order before the
/// rooms; the first clash wins.
pub fn check_resources(
    conn: &Connection,
    day_index: i64,
    slot_key: &str,
    teacher_ids: &[String],
    room_ids: &[String],
) -> Result<(), EngineError> {
    for teacher_id in teacher_ids {
        if let Some(group) = teacher_claim_holder(conn, day_index, slot_key, teacher_id)? {
            let hit = entry_for_claim(conn, day_index, slot_key, &group)?;
            return Err(booking_conflict(
                "teacher",
                teacher_id,
                day_index,
                slot_key,
                hit.as_ref(),
            ));
        }
    }
    for room_id in room_ids {
        if let Some(group) = room_claim_holder(conn, day_index, slot_key, room_id)? {
            let hit = entry_for_claim(conn, day_index, slot_key, &group)?;
            return Err(booking_conflict(
                "room",
                room_id,
                day_index,
                slot_key,
                hit.as_ref(),
            ));
        }
    }
    Ok(())
}

/// Record one unit's bookings. Resource lists must already be deduplicated
/// within the unit, so a primary-key rejection here is always a genuine
/// cross-unit clash and maps to the same conflict taxonomy the validator
/// reports.
pub fn insert_claims(
    conn: &Connection,
    day_index: i64,
    slot_key: &str,
    teacher_ids: &[String],
    room_ids: &[String],
    claim_group: &str,
) -> Result<(), EngineError> {
    for teacher_id in teacher_ids {
        let res = conn.execute(
            "INSERT INTO teacher_claims(day_index, slot_key, teacher_id, claim_group)
             VALUES(?, ?, ?, ?)",
            (day_index, slot_key, teacher_id, claim_group),
        );
        if let Err(e) = res {
            if is_constraint_violation(&e) {
                let holder = teacher_claim_holder(conn, day_index, slot_key, teacher_id)?;
                let hit = match holder {
                    Some(group) => entry_for_claim(conn, day_index, slot_key, &group)?,
                    None => None,
                };
                return Err(booking_conflict(
                    "teacher",
                    teacher_id,
                    day_index,
                    slot_key,
                    hit.as_ref(),
                ));
            }
            return Err(EngineError::db("db_insert_failed", e));
        }
    }
    for room_id in room_ids {
        let res = conn.execute(
            "INSERT INTO room_claims(day_index, slot_key, room_id, claim_group)
             VALUES(?, ?, ?, ?)",
            (day_index, slot_key, room_id, claim_group),
        );
        if let Err(e) = res {
            if is_constraint_violation(&e) {
                let holder = room_claim_holder(conn, day_index, slot_key, room_id)?;
                let hit = match holder {
                    Some(group) => entry_for_claim(conn, day_index, slot_key, &group)?,
                    None => None,
                };
                return Err(booking_conflict(
                    "room",
                    room_id,
                    day_index,
                    slot_key,
                    hit.as_ref(),
                ));
            }
            return Err(EngineError::db("db_insert_failed", e));
        }
    }
    Ok(())
}

pub fn delete_claims_for_group(conn: &Connection, claim_group: &str) -> Result<(), EngineError> {
    conn.execute(
        "DELETE FROM teacher_claims WHERE claim_group = ?",
        [claim_group],
    )
    .map_err(|e| EngineError::db("db_delete_failed", e))?;
    conn.execute(
        "DELETE FROM room_claims WHERE claim_group = ?",
        [claim_group],
    )
    .map_err(|e| EngineError::db("db_delete_failed", e))?;
    Ok(())
}

/// Error for an attempt to edit or clear a grouped row through a
/// single-cell operation.
pub fn grouped_occupant_error(entry: &RoutineEntry) -> EngineError {
    let (unit, group_id) = if let Some(span_id) = entry.span_id.as_deref() {
        ("spanned class", span_id)
    } else {
        ("elective group", entry.elective_group_id.as_deref().unwrap_or(""))
    };
    EngineError::with_details(
        "group_integrity",
        format!(
            "slot is held by a {}; clear the whole group first",
            unit
        ),
        json!({
            "groupId": group_id,
            "spanId": entry.span_id,
            "electiveGroupId": entry.elective_group_id,
            "entry": entry.view(),
        }),
    )
}
