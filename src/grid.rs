use crate::conflict::{self, EngineError, SlotRow};
use crate::model::{RoutineEntry, ScopeKey};
use rusqlite::Connection;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet};

/// Fetch one scope's rows and assemble its weekly grid.
pub fn build_grid(conn: &Connection, scope: &ScopeKey) -> Result<JsonValue, EngineError> {
    let catalog = conflict::full_catalog(conn)?;
    let entries = conflict::scope_entries(conn, scope)?;
    Ok(assemble_grid(scope, &catalog, &entries))
}

/// Pure assembly of the client-facing grid. Per day: rendered cells in
/// catalog order plus the slots covered by span continuations. A cell is
/// tagged `single`, `labPair` or `alternating` so clients never sniff row
/// shapes.
pub fn assemble_grid(
    scope: &ScopeKey,
    catalog: &[SlotRow],
    entries: &[RoutineEntry],
) -> JsonValue {
    let mut span_sizes: HashMap<&str, usize> = HashMap::new();
    for e in entries {
        if let Some(span_id) = e.span_id.as_deref() {
            *span_sizes.entry(span_id).or_insert(0) += 1;
        }
    }

    let mut days = Vec::with_capacity(7);
    for day_index in 0..7i64 {
        let mut by_slot: HashMap<&str, Vec<&RoutineEntry>> = HashMap::new();
        let mut covered_set: HashSet<&str> = HashSet::new();
        for e in entries.iter().filter(|e| e.day_index == day_index) {
            if e.span_id.is_some() && !e.span_master {
                covered_set.insert(e.slot_key.as_str());
            } else {
                by_slot.entry(e.slot_key.as_str()).or_default().push(e);
            }
        }

        let mut cells = Vec::new();
        let mut covered = Vec::new();
        for slot in catalog {
            if covered_set.contains(slot.slot_key.as_str()) {
                covered.push(slot.slot_key.clone());
            }
            let Some(rows) = by_slot.get_mut(slot.slot_key.as_str()) else {
                continue;
            };
            rows.sort_by_key(|e| e.lab_group.map(|g| g.pair_rank()).unwrap_or(2));
            let length = rows
                .iter()
                .map(|e| {
                    e.span_id
                        .as_deref()
                        .and_then(|id| span_sizes.get(id).copied())
                        .unwrap_or(1)
                })
                .max()
                .unwrap_or(1);
            cells.push(cell_view(&slot.slot_key, rows, length));
        }
        days.push(json!({
            "dayIndex": day_index,
            "cells": cells,
            "covered": covered,
        }));
    }

    json!({
        "scope": scope.view(),
        "timeSlots": catalog.iter().map(|s| s.view()).collect::<Vec<_>>(),
        "days": days,
    })
}

fn cell_view(slot_key: &str, rows: &[&RoutineEntry], span_length: usize) -> JsonValue {
    if let [only] = rows {
        if only.alternative_week {
            // One stored row, two display groups, same shape as a lab pair.
            let second = only.alternate_view().unwrap_or_else(|| only.view());
            return json!({
                "kind": "alternating",
                "slotId": slot_key,
                "spanLength": span_length,
                "alternativeWeek": true,
                "entries": [only.view(), second],
            });
        }
        return json!({
            "kind": "single",
            "slotId": slot_key,
            "spanLength": span_length,
            "entry": only.view(),
        });
    }
    json!({
        "kind": "labPair",
        "slotId": slot_key,
        "spanLength": span_length,
        "entries": rows.iter().map(|e| e.view()).collect::<Vec<_>>(),
    })
}

fn resource_schedule(
    conn: &Connection,
    table: &str,
    id_column: &str,
    resource_id: &str,
) -> Result<Vec<JsonValue>, EngineError> {
    let catalog = conflict::full_catalog(conn)?;
    let position: HashMap<&str, usize> = catalog
        .iter()
        .enumerate()
        .map(|(i, s)| (s.slot_key.as_str(), i))
        .collect();

    let sql = format!(
        "SELECT day_index, slot_key, claim_group FROM {} WHERE {} = ?",
        table, id_column
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| EngineError::db("db_query_failed", e))?;
    let mut claims: Vec<(i64, String, String)> = stmt
        .query_map([resource_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| EngineError::db("db_query_failed", e))?;
    claims.sort_by_key(|(day, slot, _)| {
        (
            *day,
            position.get(slot.as_str()).copied().unwrap_or(usize::MAX),
        )
    });

    let mut entries = Vec::with_capacity(claims.len());
    for (day, slot, group) in &claims {
        if let Some(entry) = conflict::entry_for_claim(conn, *day, slot, group)? {
            entries.push(entry.view());
        }
    }
    Ok(entries)
}

/// Week view of one teacher's commitments across every scope, one row per
/// occupied (day, slot).
pub fn teacher_schedule(conn: &Connection, teacher_id: &str) -> Result<JsonValue, EngineError> {
    let entries = resource_schedule(conn, "teacher_claims", "teacher_id", teacher_id)?;
    Ok(json!({ "teacherId": teacher_id, "entries": entries }))
}

pub fn room_schedule(conn: &Connection, room_id: &str) -> Result<JsonValue, EngineError> {
    let entries = resource_schedule(conn, "room_claims", "room_id", room_id)?;
    Ok(json!({ "roomId": room_id, "entries": entries }))
}
