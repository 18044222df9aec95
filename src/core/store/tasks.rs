use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::types::{NewTask, Task, TaskFilter, TaskStatus, TaskUpdate};
use super::{decode_timestamp, encode_timestamp, sql_limit};

const TASK_COLUMNS: &str = "id, name, command, server_id, status, created_at, last_run, result";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(4)?;
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        command: row.get(2)?,
        server_id: row.get(3)?,
        status: TaskStatus::from_status(&status).unwrap_or(TaskStatus::Failed),
        created_at: decode_timestamp(row.get(5)?).unwrap_or_default(),
        last_run: decode_timestamp(row.get(6)?),
        result: row.get(7)?,
    })
}

pub(super) fn get(db: &Connection, id: i64) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    Ok(db.query_row(&sql, params![id], from_row).optional()?)
}

pub(super) fn list(db: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks
         WHERE (?1 IS NULL OR server_id = ?1)
         ORDER BY id LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = db.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            filter.server_id,
            sql_limit(Some(filter.limit)),
            filter.offset as i64
        ],
        from_row,
    )?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub(super) fn insert(db: &Connection, task: &NewTask) -> Result<Task> {
    db.execute(
        "INSERT INTO tasks (name, command, server_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            task.name,
            task.command,
            task.server_id,
            TaskStatus::Pending.as_str(),
            encode_timestamp(&Utc::now())
        ],
    )?;
    let id = db.last_insert_rowid();
    get(db, id)?.ok_or_else(|| anyhow::anyhow!("task {} vanished after insert", id))
}

pub(super) fn update(db: &Connection, id: i64, update: &TaskUpdate) -> Result<Option<Task>> {
    db.execute(
        "UPDATE tasks SET
            name = COALESCE(?1, name),
            command = COALESCE(?2, command),
            server_id = COALESCE(?3, server_id)
         WHERE id = ?4",
        params![update.name, update.command, update.server_id, id],
    )?;
    get(db, id)
}

pub(super) fn delete(db: &Connection, id: i64) -> Result<bool> {
    let rows_deleted = db.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    Ok(rows_deleted > 0)
}

pub(super) fn mark_running(db: &Connection, id: i64) -> Result<Option<Task>> {
    let rows_updated = db.execute(
        "UPDATE tasks SET status = ?1, last_run = ?2 WHERE id = ?3 AND status = ?4",
        params![
            TaskStatus::Running.as_str(),
            encode_timestamp(&Utc::now()),
            id,
            TaskStatus::Pending.as_str()
        ],
    )?;
    if rows_updated == 0 {
        return Ok(None);
    }
    get(db, id)
}

pub(super) fn update_status(
    db: &Connection,
    id: i64,
    status: TaskStatus,
    result: Option<&str>,
) -> Result<Option<Task>> {
    db.execute(
        "UPDATE tasks SET status = ?1, result = COALESCE(?2, result) WHERE id = ?3",
        params![status.as_str(), result, id],
    )?;
    get(db, id)
}
