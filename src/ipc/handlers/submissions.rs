use crate::dates::format_date;
use crate::ipc::helpers::{get_required_str, record_json, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

fn submissions_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let records = ledger::all(conn)?;
    let records_json: Vec<serde_json::Value> = records.iter().map(record_json).collect();
    Ok(json!({ "records": records_json }))
}

fn submissions_summary(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let records = ledger::all(conn)?;
    let sessions: Vec<serde_json::Value> = ledger::summarize(&records)
        .iter()
        .map(|s| {
            json!({
                "date": format_date(s.date),
                "lesson": s.lesson,
                "weekday": s.weekday,
                "period": s.period,
                "presentStudentIds": s.present,
                "absentStudentIds": s.absent,
                "absentCount": s.absent.len(),
                "fullPresence": s.full_presence(),
            })
        })
        .collect();
    Ok(json!({ "sessions": sessions }))
}

fn submissions_export_csv(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let row_count = ledger::export_csv(conn, &out_path)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "rowCount": row_count,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.list" => Some(with_db(state, req, submissions_list)),
        "submissions.summary" => Some(with_db(state, req, submissions_summary)),
        "submissions.exportCsv" => Some(with_db(state, req, submissions_export_csv)),
        _ => None,
    }
}
