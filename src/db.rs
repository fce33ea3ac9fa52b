use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("routine.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS time_slots(
            slot_key TEXT PRIMARY KEY,
            day_type TEXT NOT NULL DEFAULT 'ALL',
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            is_break INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    // Existing workspaces may predate per-day-type catalogs.
    ensure_time_slots_day_type(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_time_slots_order ON time_slots(day_type, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS routine_slots(
            id TEXT PRIMARY KEY,
            program_code TEXT NOT NULL,
            semester INTEGER NOT NULL,
            section TEXT NOT NULL,
            day_index INTEGER NOT NULL,
            slot_key TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_type TEXT NOT NULL,
            teacher_ids_json TEXT NOT NULL,
            room_id TEXT NOT NULL,
            notes TEXT,
            lab_group TEXT,
            span_id TEXT,
            span_master INTEGER NOT NULL DEFAULT 0,
            alternative_week INTEGER NOT NULL DEFAULT 0,
            alternate_group_json TEXT,
            elective_class INTEGER NOT NULL DEFAULT 0,
            elective_group_id TEXT,
            cross_section INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_routine_slots_scope
         ON routine_slots(program_code, semester, section)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_routine_slots_cell
         ON routine_slots(program_code, semester, section, day_index, slot_key)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_routine_slots_moment
         ON routine_slots(day_index, slot_key)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_routine_slots_span ON routine_slots(span_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_routine_slots_elective ON routine_slots(elective_group_id)",
        [],
    )?;

    // Claim tables double as the conflict index and as the storage-level
    // uniqueness backstop: the primary keys reject any double booking the
    // in-transaction validator missed.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_claims(
            day_index INTEGER NOT NULL,
            slot_key TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            claim_group TEXT NOT NULL,
            PRIMARY KEY(day_index, slot_key, teacher_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_claims_group ON teacher_claims(claim_group)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_claims_teacher ON teacher_claims(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS room_claims(
            day_index INTEGER NOT NULL,
            slot_key TEXT NOT NULL,
            room_id TEXT NOT NULL,
            claim_group TEXT NOT NULL,
            PRIMARY KEY(day_index, slot_key, room_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_room_claims_group ON room_claims(claim_group)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_room_claims_room ON room_claims(room_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_time_slots_day_type(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "time_slots", "day_type")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE time_slots ADD COLUMN day_type TEXT NOT NULL DEFAULT 'ALL'",
        [],
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
