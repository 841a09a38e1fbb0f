use crate::catalog;
use crate::dates::format_date;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_str, get_required_str, get_str_list, lesson_json, parse_date_param,
    record_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use crate::session::SubmissionSession;
use serde_json::json;
use uuid::Uuid;

fn session_json(session_id: &str, s: &SubmissionSession) -> serde_json::Value {
    let roster_json: Vec<serde_json::Value> = s
        .roster()
        .ids()
        .iter()
        .map(|id| json!({ "studentId": id, "present": s.is_present(id) }))
        .collect();
    json!({
        "sessionId": session_id,
        "lesson": lesson_json(s.lesson()),
        "date": format_date(s.date()),
        "state": s.state().as_str(),
        "roster": roster_json,
        "presentCount": s.present().len(),
        "outsideLessonWindow": !s.lesson().is_active_on(s.date()),
    })
}

fn session_id_param(params: &serde_json::Value) -> Result<String, HandlerErr> {
    get_required_str(params, "sessionId")
}

fn not_found(session_id: &str) -> HandlerErr {
    HandlerErr::new("not_found", format!("session not found: {}", session_id))
}

fn session_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let lesson_name = get_required_str(params, "lessonName")?;
    let date = match get_optional_str(params, "date") {
        Some(raw) => parse_date_param(&raw, "date")?,
        None => chrono::Local::now().date_naive(),
    };
    let Some(lesson) = catalog::get(conn, lesson_name.trim())? else {
        return Err(HandlerErr::new(
            "not_found",
            format!("lesson not found: {}", lesson_name),
        ));
    };
    let roster = roster::load(conn)?;
    let session = SubmissionSession::open(lesson, roster, date)?;

    let session_id = Uuid::new_v4().to_string();
    let result = session_json(&session_id, &session);
    state.sessions.insert(session_id, session);
    Ok(result)
}

fn session_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session_id = session_id_param(params)?;
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| not_found(&session_id))?;
    Ok(session_json(&session_id, session))
}

fn session_mark_present(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = session_id_param(params)?;
    let student_ids = get_str_list(params, "studentIds")?;
    let session = state
        .sessions
        .get_mut(&session_id)
        .ok_or_else(|| not_found(&session_id))?;
    let newly_marked = session.mark_present(&student_ids)?;
    Ok(json!({
        "newlyMarked": newly_marked,
        "presentCount": session.present().len(),
    }))
}

fn session_finalize(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session_id = session_id_param(params)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let session = state
        .sessions
        .get_mut(&session_id)
        .ok_or_else(|| not_found(&session_id))?;

    // On failure the session stays registered with its marks for a retry.
    let mut sink = conn;
    let records = session.finalize(&mut sink)?;
    state.sessions.remove(&session_id);

    let records_json: Vec<serde_json::Value> = records.iter().map(record_json).collect();
    Ok(json!({
        "sessionId": session_id,
        "recordCount": records.len(),
        "records": records_json,
    }))
}

fn session_abandon(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session_id = session_id_param(params)?;
    let session = state
        .sessions
        .remove(&session_id)
        .ok_or_else(|| not_found(&session_id))?;
    session.abandon();
    Ok(json!({ "sessionId": session_id, "abandoned": true }))
}

fn respond(
    state: &mut AppState,
    req: &Request,
    f: fn(&mut AppState, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match f(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.open" => Some(respond(state, req, session_open)),
        "session.get" => Some(respond(state, req, session_get)),
        "session.markPresent" => Some(respond(state, req, session_mark_present)),
        "session.finalize" => Some(respond(state, req, session_finalize)),
        "session.abandon" => Some(respond(state, req, session_abandon)),
        _ => None,
    }
}
