use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::types::{MetricsSnapshot, NewServer, Server, ServerPatch};
use super::{decode_timestamp, encode_timestamp, sql_limit};

const SERVER_COLUMNS: &str = "id, name, host, port, server_type, api_key, connected, connection_id, \
     connection_error_count, command_error_count, last_connected, last_error, last_metrics";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Server> {
    let port: i64 = row.get(3)?;
    let metrics: Option<String> = row.get(12)?;
    Ok(Server {
        id: row.get(0)?,
        name: row.get(1)?,
        host: row.get(2)?,
        port: u16::try_from(port).unwrap_or_default(),
        server_type: row.get(4)?,
        api_key: row.get(5)?,
        connected: row.get(6)?,
        connection_id: row.get(7)?,
        connection_error_count: row.get(8)?,
        command_error_count: row.get(9)?,
        last_connected: decode_timestamp(row.get(10)?),
        last_error: row.get(11)?,
        last_metrics: metrics.and_then(|m| serde_json::from_str::<MetricsSnapshot>(&m).ok()),
    })
}

pub(super) fn get(db: &Connection, id: i64) -> Result<Option<Server>> {
    let sql = format!("SELECT {SERVER_COLUMNS} FROM servers WHERE id = ?1");
    Ok(db.query_row(&sql, params![id], from_row).optional()?)
}

pub(super) fn get_by_name(db: &Connection, name: &str) -> Result<Option<Server>> {
    let sql = format!("SELECT {SERVER_COLUMNS} FROM servers WHERE name = ?1");
    Ok(db.query_row(&sql, params![name], from_row).optional()?)
}

pub(super) fn list(db: &Connection, offset: usize, limit: Option<usize>) -> Result<Vec<Server>> {
    let sql = format!("SELECT {SERVER_COLUMNS} FROM servers ORDER BY id LIMIT ?1 OFFSET ?2");
    let mut stmt = db.prepare(&sql)?;
    let rows = stmt.query_map(params![sql_limit(limit), offset as i64], from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub(super) fn insert(db: &Connection, server: &NewServer) -> Result<Server> {
    db.execute(
        "INSERT INTO servers (name, host, port, server_type, api_key) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            server.name,
            server.host,
            server.port,
            server.server_type,
            server.api_key
        ],
    )?;
    let id = db.last_insert_rowid();
    get(db, id)?.ok_or_else(|| anyhow::anyhow!("server {} vanished after insert", id))
}

fn text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

pub(super) fn update(db: &Connection, id: i64, patch: &ServerPatch) -> Result<Option<Server>> {
    if patch.is_empty() {
        return get(db, id);
    }

    let mut columns: Vec<&'static str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(name) = &patch.name {
        columns.push("name");
        values.push(Value::Text(name.clone()));
    }
    if let Some(host) = &patch.host {
        columns.push("host");
        values.push(Value::Text(host.clone()));
    }
    if let Some(port) = patch.port {
        columns.push("port");
        values.push(Value::Integer(i64::from(port)));
    }
    if let Some(server_type) = &patch.server_type {
        columns.push("server_type");
        values.push(Value::Text(server_type.clone()));
    }
    if let Some(api_key) = &patch.api_key {
        columns.push("api_key");
        values.push(text(api_key));
    }
    if let Some(connected) = patch.connected {
        columns.push("connected");
        values.push(Value::Integer(i64::from(connected)));
    }
    if let Some(connection_id) = &patch.connection_id {
        columns.push("connection_id");
        values.push(text(connection_id));
    }
    if let Some(count) = patch.connection_error_count {
        columns.push("connection_error_count");
        values.push(Value::Integer(count));
    }
    if let Some(count) = patch.command_error_count {
        columns.push("command_error_count");
        values.push(Value::Integer(count));
    }
    if let Some(last_connected) = &patch.last_connected {
        columns.push("last_connected");
        values.push(text(&last_connected.as_ref().map(encode_timestamp)));
    }
    if let Some(last_error) = &patch.last_error {
        columns.push("last_error");
        values.push(text(last_error));
    }
    if let Some(metrics) = &patch.last_metrics {
        columns.push("last_metrics");
        let encoded = metrics.as_ref().map(serde_json::to_string).transpose()?;
        values.push(text(&encoded));
    }

    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    values.push(Value::Integer(id));
    let sql = format!(
        "UPDATE servers SET {assignments} WHERE id = ?{}",
        values.len()
    );
    db.execute(&sql, params_from_iter(values.iter()))?;
    get(db, id)
}

pub(super) fn delete(db: &Connection, id: i64) -> Result<bool> {
    let rows_deleted = db.execute("DELETE FROM servers WHERE id = ?1", params![id])?;
    Ok(rows_deleted > 0)
}

pub(super) fn reset_connection_state(db: &Connection) -> Result<usize> {
    let rows = db.execute(
        "UPDATE servers SET connected = 0, connection_id = NULL
         WHERE connected = 1 OR connection_id IS NOT NULL",
        [],
    )?;
    Ok(rows)
}
