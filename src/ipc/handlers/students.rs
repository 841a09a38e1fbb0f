use crate::ipc::helpers::{get_required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, StudentRoster};
use rusqlite::Connection;
use serde_json::json;

fn roster_json(roster: &StudentRoster) -> serde_json::Value {
    json!({ "studentIds": roster.ids() })
}

fn students_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    Ok(roster_json(&roster::load(conn)?))
}

fn students_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    Ok(roster_json(&roster::add(conn, &student_id)?))
}

fn students_rename(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let old_id = get_required_str(params, "oldId")?;
    let new_id = get_required_str(params, "newId")?;
    Ok(roster_json(&roster::rename(conn, &old_id, &new_id)?))
}

fn students_remove(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    Ok(roster_json(&roster::remove(conn, &student_id)?))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_db(state, req, students_list)),
        "students.add" => Some(with_db(state, req, students_add)),
        "students.rename" => Some(with_db(state, req, students_rename)),
        "students.remove" => Some(with_db(state, req, students_remove)),
        _ => None,
    }
}
