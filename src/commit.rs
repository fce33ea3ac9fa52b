use crate::conflict::{self, EngineError};
use crate::model::{ClassPayload, LabGroup, RoutineEntry, ScopeKey, ENTRY_COLUMNS};
use crate::slotkey::SlotKey;
use log::debug;
use rusqlite::{params, Connection};
use serde_json::json;
use uuid::Uuid;

pub fn now_ts() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

pub struct SpanOutcome {
    pub span_id: String,
    pub entries: Vec<RoutineEntry>,
}

pub struct ElectiveOutcome {
    pub elective_group_id: String,
    pub entries: Vec<RoutineEntry>,
}

#[derive(Default)]
pub struct ClearOutcome {
    pub deleted_count: usize,
    pub teacher_ids: Vec<String>,
    pub room_ids: Vec<String>,
}

impl ClearOutcome {
    fn absorb(&mut self, entry: &RoutineEntry) {
        self.deleted_count += 1;
        for id in entry.claim_teachers() {
            if !self.teacher_ids.contains(&id) {
                self.teacher_ids.push(id);
            }
        }
        for id in entry.claim_rooms() {
            if !self.room_ids.contains(&id) {
                self.room_ids.push(id);
            }
        }
    }
}

fn new_entry(
    scope: &ScopeKey,
    day_index: i64,
    slot_key: &str,
    payload: &ClassPayload,
    now: &str,
) -> RoutineEntry {
    RoutineEntry {
        id: Uuid::new_v4().to_string(),
        program_code: scope.program_code.clone(),
        semester: scope.semester,
        section: scope.section.clone(),
        day_index,
        slot_key: slot_key.to_string(),
        subject_id: payload.subject_id.clone(),
        class_type: payload.class_type,
        teacher_ids: payload.teacher_ids.clone(),
        room_id: payload.room_id.clone(),
        notes: payload.notes.clone(),
        lab_group: payload.lab_group,
        span_id: None,
        span_master: false,
        alternative_week: payload.alternative_week,
        alternate_group: payload.alternate_group.clone(),
        elective_class: false,
        elective_group_id: None,
        cross_section: false,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    }
}

fn insert_entry(conn: &Connection, e: &RoutineEntry) -> Result<(), EngineError> {
    let teacher_ids_json =
        serde_json::to_string(&e.teacher_ids).unwrap_or_else(|_| "[]".to_string());
    let alternate_group_json = e
        .alternate_group
        .as_ref()
        .map(|ag| serde_json::to_string(ag).unwrap_or_else(|_| "{}".to_string()));
    conn.execute(
        "INSERT INTO routine_slots(
             id, program_code, semester, section, day_index, slot_key,
             subject_id, class_type, teacher_ids_json, room_id, notes, lab_group,
             span_id, span_master, alternative_week, alternate_group_json,
             elective_class, elective_group_id, cross_section, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
             ?16, ?17, ?18, ?19, ?20, ?21)",
        params![
            e.id,
            e.program_code,
            e.semester,
            e.section,
            e.day_index,
            e.slot_key,
            e.subject_id,
            e.class_type.as_str(),
            teacher_ids_json,
            e.room_id,
            e.notes,
            e.lab_group.map(|g| g.as_str()),
            e.span_id,
            e.span_master as i64,
            e.alternative_week as i64,
            alternate_group_json,
            e.elective_class as i64,
            e.elective_group_id,
            e.cross_section as i64,
            e.created_at,
            e.updated_at,
        ],
    )
    .map_err(|err| EngineError::db("db_insert_failed", err))?;
    Ok(())
}

fn delete_entry_row(conn: &Connection, id: &str) -> Result<(), EngineError> {
    conn.execute("DELETE FROM routine_slots WHERE id = ?", [id])
        .map_err(|e| EngineError::db("db_delete_failed", e))?;
    Ok(())
}

/// Make room for a candidate in one cell. Plain occupants the candidate
/// collides with are deleted along with their claims; a complementary
/// lab-group occupant is kept as the pair partner. Replacing a span or
/// elective member this way is refused, those are cleared as a group.
///
/// Pairing needs a plain or span occupant whose lab group complements the
/// candidate's; an alternating row on either side always replaces instead,
/// its two weeks may disagree about the group split.
fn replace_cell_occupants(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slot_key: &str,
    candidate_lab: Option<LabGroup>,
    candidate_alternates: bool,
) -> Result<Vec<RoutineEntry>, EngineError> {
    let wanted_partner = if candidate_alternates {
        None
    } else {
        candidate_lab.and_then(|g| g.complement())
    };
    let mut replaced = Vec::new();
    for occ in conflict::cell_entries(conn, scope, day_index, slot_key)? {
        let pairs_up = wanted_partner.is_some()
            && occ.lab_group == wanted_partner
            && !occ.alternative_week;
        if pairs_up {
            continue;
        }
        if occ.span_id.is_some() || occ.elective_group_id.is_some() {
            return Err(conflict::grouped_occupant_error(&occ));
        }
        conflict::delete_claims_for_group(conn, &occ.id)?;
        delete_entry_row(conn, &occ.id)?;
        replaced.push(occ);
    }
    if !replaced.is_empty() {
        debug!(
            "replaced {} occupant(s) at {} day {} slot {}",
            replaced.len(),
            scope.label(),
            day_index,
            slot_key
        );
    }
    Ok(replaced)
}

fn exec_assign_single(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slot: &SlotKey,
    payload: &ClassPayload,
) -> Result<RoutineEntry, EngineError> {
    let slot_row = conflict::resolve_teaching_slot(conn, slot)?;
    replace_cell_occupants(
        conn,
        scope,
        day_index,
        &slot_row.slot_key,
        payload.lab_group,
        payload.alternative_week,
    )?;
    let entry = new_entry(scope, day_index, &slot_row.slot_key, payload, &now_ts());
    conflict::check_resources(
        conn,
        day_index,
        &slot_row.slot_key,
        &entry.claim_teachers(),
        &entry.claim_rooms(),
    )?;
    insert_entry(conn, &entry)?;
    conflict::insert_claims(
        conn,
        day_index,
        &slot_row.slot_key,
        &entry.claim_teachers(),
        &entry.claim_rooms(),
        entry.claim_group(),
    )?;
    Ok(entry)
}

fn span_geometry_error(message: &str, slots: &[SlotKey]) -> EngineError {
    EngineError::with_details(
        "group_integrity",
        message.to_string(),
        json!({ "slotIds": slots.iter().map(|s| s.as_str()).collect::<Vec<_>>() }),
    )
}

fn exec_assign_spanned(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slots: &[SlotKey],
    payload: &ClassPayload,
) -> Result<SpanOutcome, EngineError> {
    if slots.len() < 2 {
        return Err(EngineError::bad_params(
            "spanned assignment needs at least two slots",
        ));
    }
    for (i, key) in slots.iter().enumerate() {
        if slots[..i].iter().any(|k| k == key) {
            return Err(EngineError::bad_params(format!(
                "duplicate slot id in span: {}",
                key
            )));
        }
    }

    let mut resolved = Vec::with_capacity(slots.len());
    for key in slots {
        resolved.push(conflict::resolve_teaching_slot(conn, key)?);
    }
    let day_type = resolved[0].day_type.clone();
    if resolved.iter().any(|s| s.day_type != day_type) {
        return Err(span_geometry_error(
            "span slots must share one day type",
            slots,
        ));
    }
    // Contiguity: every catalog position between the lowest and highest
    // member must itself be a member, breaks included.
    let min_order = resolved.iter().map(|s| s.sort_order).min().unwrap_or(0);
    let max_order = resolved.iter().map(|s| s.sort_order).max().unwrap_or(0);
    let between: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM time_slots
             WHERE day_type = ? AND sort_order BETWEEN ? AND ?",
            params![day_type, min_order, max_order],
            |r| r.get(0),
        )
        .map_err(|e| EngineError::db("db_query_failed", e))?;
    if between != resolved.len() as i64 {
        return Err(span_geometry_error(
            "span slots must occupy adjacent periods",
            slots,
        ));
    }

    let teachers = payload.claim_teachers();
    let rooms = payload.claim_rooms();
    for slot_row in &resolved {
        replace_cell_occupants(
            conn,
            scope,
            day_index,
            &slot_row.slot_key,
            payload.lab_group,
            payload.alternative_week,
        )?;
        conflict::check_resources(conn, day_index, &slot_row.slot_key, &teachers, &rooms)?;
    }

    let span_id = Uuid::new_v4().to_string();
    let now = now_ts();
    resolved.sort_by_key(|s| s.sort_order);
    let mut entries = Vec::with_capacity(resolved.len());
    for (i, slot_row) in resolved.iter().enumerate() {
        let mut entry = new_entry(scope, day_index, &slot_row.slot_key, payload, &now);
        entry.span_id = Some(span_id.clone());
        entry.span_master = i == 0;
        insert_entry(conn, &entry)?;
        conflict::insert_claims(
            conn,
            day_index,
            &slot_row.slot_key,
            &teachers,
            &rooms,
            &span_id,
        )?;
        entries.push(entry);
    }
    Ok(SpanOutcome { span_id, entries })
}

fn exec_assign_elective(
    conn: &Connection,
    scopes: &[ScopeKey],
    day_index: i64,
    slot: &SlotKey,
    payload: &ClassPayload,
) -> Result<ElectiveOutcome, EngineError> {
    if scopes.is_empty() {
        return Err(EngineError::bad_params("scopes must not be empty"));
    }
    for (i, scope) in scopes.iter().enumerate() {
        if scopes[..i].contains(scope) {
            return Err(EngineError::bad_params(format!(
                "duplicate scope in scopes: {}",
                scope.label()
            )));
        }
    }
    if payload.lab_group.is_some() || payload.alternative_week {
        return Err(EngineError::bad_params(
            "elective payload cannot carry labGroup or alternativeWeek",
        ));
    }

    let slot_row = conflict::resolve_teaching_slot(conn, slot)?;
    for scope in scopes {
        replace_cell_occupants(conn, scope, day_index, &slot_row.slot_key, None, false)?;
    }
    let teachers = payload.claim_teachers();
    let rooms = payload.claim_rooms();
    conflict::check_resources(conn, day_index, &slot_row.slot_key, &teachers, &rooms)?;

    let elective_group_id = Uuid::new_v4().to_string();
    let now = now_ts();
    let cross_section = scopes.len() > 1;
    let mut entries = Vec::with_capacity(scopes.len());
    for scope in scopes {
        let mut entry = new_entry(scope, day_index, &slot_row.slot_key, payload, &now);
        entry.elective_class = true;
        entry.elective_group_id = Some(elective_group_id.clone());
        entry.cross_section = cross_section;
        insert_entry(conn, &entry)?;
        entries.push(entry);
    }
    // One claim set for the whole replica set: the teacher commitment is
    // physically shared, not repeated per section.
    conflict::insert_claims(
        conn,
        day_index,
        &slot_row.slot_key,
        &teachers,
        &rooms,
        &elective_group_id,
    )?;
    Ok(ElectiveOutcome {
        elective_group_id,
        entries,
    })
}

fn exec_clear_cell(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slot: &SlotKey,
    lab_group: Option<LabGroup>,
) -> Result<ClearOutcome, EngineError> {
    let slot_row = conflict::resolve_slot(conn, slot)?;
    let mut outcome = ClearOutcome::default();
    for occ in conflict::cell_entries(conn, scope, day_index, &slot_row.slot_key)? {
        if let Some(g) = lab_group {
            if occ.lab_group != Some(g) {
                continue;
            }
        }
        if occ.span_id.is_some() || occ.elective_group_id.is_some() {
            return Err(conflict::grouped_occupant_error(&occ));
        }
        conflict::delete_claims_for_group(conn, &occ.id)?;
        delete_entry_row(conn, &occ.id)?;
        outcome.absorb(&occ);
    }
    Ok(outcome)
}

fn group_entries(conn: &Connection, group_id: &str) -> Result<Vec<RoutineEntry>, EngineError> {
    let sql = format!(
        "SELECT {} FROM routine_slots
         WHERE span_id = ?1 OR elective_group_id = ?1
         ORDER BY day_index, slot_key, program_code, semester, section",
        ENTRY_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| EngineError::db("db_query_failed", e))?;
    stmt.query_map([group_id], RoutineEntry::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| EngineError::db("db_query_failed", e))
}

fn exec_clear_group(conn: &Connection, group_id: &str) -> Result<ClearOutcome, EngineError> {
    let rows = group_entries(conn, group_id)?;
    if rows.is_empty() {
        return Err(EngineError::with_details(
            "not_found",
            format!("no span or elective group {}", group_id),
            json!({ "groupId": group_id }),
        ));
    }
    conn.execute(
        "DELETE FROM routine_slots WHERE span_id = ?1 OR elective_group_id = ?1",
        [group_id],
    )
    .map_err(|e| EngineError::db("db_delete_failed", e))?;
    conflict::delete_claims_for_group(conn, group_id)?;
    let mut outcome = ClearOutcome::default();
    for row in &rows {
        outcome.absorb(row);
    }
    Ok(outcome)
}

fn exec_clear_scope(conn: &Connection, scope: &ScopeKey) -> Result<ClearOutcome, EngineError> {
    let rows = conflict::scope_entries(conn, scope)?;
    conn.execute(
        "DELETE FROM routine_slots WHERE program_code = ? AND semester = ? AND section = ?",
        params![scope.program_code, scope.semester, scope.section],
    )
    .map_err(|e| EngineError::db("db_delete_failed", e))?;

    let mut outcome = ClearOutcome::default();
    let mut seen_groups: Vec<String> = Vec::new();
    for row in &rows {
        outcome.absorb(row);
        let group = row.claim_group().to_string();
        if seen_groups.contains(&group) {
            continue;
        }
        seen_groups.push(group.clone());
        if row.elective_group_id.is_some() {
            // Replicas in other scopes keep the shared booking alive.
            let survivors: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM routine_slots WHERE elective_group_id = ?",
                    [&group],
                    |r| r.get(0),
                )
                .map_err(|e| EngineError::db("db_query_failed", e))?;
            if survivors > 0 {
                continue;
            }
        }
        conflict::delete_claims_for_group(conn, &group)?;
    }
    debug!(
        "cleared {} rows for {}",
        outcome.deleted_count,
        scope.label()
    );
    Ok(outcome)
}

fn in_tx<T>(
    conn: &Connection,
    work: impl FnOnce(&Connection) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::db("db_tx_failed", e))?;
    match work(&tx) {
        Ok(value) => {
            tx.commit().map_err(|e| EngineError::db("db_commit_failed", e))?;
            Ok(value)
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn dry_run<T>(
    conn: &Connection,
    work: impl FnOnce(&Connection) -> Result<T, EngineError>,
) -> Result<(), EngineError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::db("db_tx_failed", e))?;
    let res = work(&tx).map(|_| ());
    let _ = tx.rollback();
    res
}

pub fn assign_single(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slot: &SlotKey,
    payload: &ClassPayload,
) -> Result<RoutineEntry, EngineError> {
    in_tx(conn, |c| exec_assign_single(c, scope, day_index, slot, payload))
}

pub fn check_single(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slot: &SlotKey,
    payload: &ClassPayload,
) -> Result<(), EngineError> {
    dry_run(conn, |c| exec_assign_single(c, scope, day_index, slot, payload))
}

pub fn assign_spanned(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slots: &[SlotKey],
    payload: &ClassPayload,
) -> Result<SpanOutcome, EngineError> {
    in_tx(conn, |c| exec_assign_spanned(c, scope, day_index, slots, payload))
}

pub fn check_spanned(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slots: &[SlotKey],
    payload: &ClassPayload,
) -> Result<(), EngineError> {
    dry_run(conn, |c| exec_assign_spanned(c, scope, day_index, slots, payload))
}

pub fn assign_elective(
    conn: &Connection,
    scopes: &[ScopeKey],
    day_index: i64,
    slot: &SlotKey,
    payload: &ClassPayload,
) -> Result<ElectiveOutcome, EngineError> {
    in_tx(conn, |c| exec_assign_elective(c, scopes, day_index, slot, payload))
}

pub fn check_elective(
    conn: &Connection,
    scopes: &[ScopeKey],
    day_index: i64,
    slot: &SlotKey,
    payload: &ClassPayload,
) -> Result<(), EngineError> {
    dry_run(conn, |c| exec_assign_elective(c, scopes, day_index, slot, payload))
}

pub fn clear_cell(
    conn: &Connection,
    scope: &ScopeKey,
    day_index: i64,
    slot: &SlotKey,
    lab_group: Option<LabGroup>,
) -> Result<ClearOutcome, EngineError> {
    in_tx(conn, |c| exec_clear_cell(c, scope, day_index, slot, lab_group))
}

pub fn clear_group(conn: &Connection, group_id: &str) -> Result<ClearOutcome, EngineError> {
    in_tx(conn, |c| exec_clear_group(c, group_id))
}

pub fn clear_scope(conn: &Connection, scope: &ScopeKey) -> Result<ClearOutcome, EngineError> {
    in_tx(conn, |c| exec_clear_scope(c, scope))
}
