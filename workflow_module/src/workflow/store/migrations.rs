use rusqlite::Connection;
use std::collections::HashSet;

use super::super::types::WorkflowError;

pub(super) fn ensure_workflow_columns(conn: &Connection) -> Result<(), WorkflowError> {
    let mut stmt = conn.prepare("PRAGMA table_info(workflows)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }

    if !columns.contains("needs_reconciliation") {
        conn.execute(
            "ALTER TABLE workflows ADD COLUMN needs_reconciliation INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !columns.contains("failure_reason") {
        conn.execute("ALTER TABLE workflows ADD COLUMN failure_reason TEXT", [])?;
    }
    Ok(())
}

pub(super) fn ensure_approval_columns(conn: &Connection) -> Result<(), WorkflowError> {
    let mut stmt = conn.prepare("PRAGMA table_info(approvals)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }

    if !columns.contains("reason") {
        conn.execute("ALTER TABLE approvals ADD COLUMN reason TEXT", [])?;
    }
    if !columns.contains("resolved_at") {
        conn.execute("ALTER TABLE approvals ADD COLUMN resolved_at TEXT", [])?;
    }
    Ok(())
}
