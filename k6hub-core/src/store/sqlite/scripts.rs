//! Script rows

use rusqlite::{Connection, OptionalExtension, params};

use super::rows::{self, SCRIPT_COLUMNS};
use crate::ids::ScriptId;
use crate::script::Script;
use crate::store::StoreError;
use crate::store::codec::millis;

pub(super) fn insert(conn: &Connection, script: &Script) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO scripts (id, name, description, content, script_type, author_id,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            script.id,
            script.name,
            script.description,
            script.content,
            script.script_type,
            script.author_id,
            millis(script.created_at),
            millis(script.updated_at),
        ],
    )?;
    Ok(())
}

pub(super) fn get(conn: &Connection, id: ScriptId) -> Result<Option<Script>, StoreError> {
    let script = conn
        .query_row(
            &format!("SELECT {SCRIPT_COLUMNS} FROM scripts WHERE id = ?1"),
            [id],
            rows::script,
        )
        .optional()?;
    Ok(script)
}

pub(super) fn list(conn: &Connection) -> Result<Vec<Script>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCRIPT_COLUMNS} FROM scripts ORDER BY created_at DESC, rowid DESC"
    ))?;
    let scripts = stmt
        .query_map([], rows::script)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(scripts)
}
