use crate::catalog;
use crate::ipc::helpers::{get_optional_str, lesson_json, parse_lesson, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn lessons_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let lessons = catalog::list(conn)?;
    let lessons_json: Vec<serde_json::Value> = lessons.values().map(lesson_json).collect();
    Ok(json!({ "lessons": lessons_json }))
}

fn lessons_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name_key = get_optional_str(params, "nameKey");
    let lesson = parse_lesson(params.get("lesson").unwrap_or(&serde_json::Value::Null))?;
    let stored = catalog::upsert(conn, name_key.as_deref(), &lesson)?;
    Ok(json!({ "lesson": lesson_json(&stored) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lessons.list" => Some(with_db(state, req, lessons_list)),
        "lessons.upsert" => Some(with_db(state, req, lessons_upsert)),
        _ => None,
    }
}
