use crate::catalog::{Lesson, Weekday};
use crate::dates::{format_date, parse_date};
use crate::error::LedgerError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger::SubmissionRecord;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<LedgerError> for HandlerErr {
    fn from(e: LedgerError) -> Self {
        let details = match &e {
            LedgerError::Schema { missing } => Some(json!({ "missing": missing })),
            _ => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

/// Runs `f` against the open workspace database and wraps the outcome.
pub fn with_db(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_str_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain strings", key)))
        })
        .collect()
}

pub fn parse_date_param(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(raw).ok_or_else(|| {
        HandlerErr::from(LedgerError::validation(format!(
            "{} must be yyyy-MM-dd, got {:?}",
            key, raw
        )))
    })
}

pub fn parse_lesson(v: &serde_json::Value) -> Result<Lesson, HandlerErr> {
    if !v.is_object() {
        return Err(HandlerErr::bad_params("missing lesson"));
    }
    let name = get_required_str(v, "name")?;
    let weekday = get_required_str(v, "weekday")?.parse::<Weekday>()?;
    let period = v
        .get("period")
        .and_then(|p| p.as_str())
        .unwrap_or("")
        .to_string();
    let begin_date = parse_date_param(&get_required_str(v, "beginDate")?, "beginDate")?;
    let end_date = parse_date_param(&get_required_str(v, "endDate")?, "endDate")?;
    Ok(Lesson {
        name,
        weekday,
        period,
        begin_date,
        end_date,
    })
}

pub fn lesson_json(l: &Lesson) -> serde_json::Value {
    json!({
        "name": l.name,
        "weekday": l.weekday.as_str(),
        "period": l.period,
        "beginDate": format_date(l.begin_date),
        "endDate": format_date(l.end_date),
    })
}

pub fn record_json(r: &SubmissionRecord) -> serde_json::Value {
    json!({
        "date": format_date(r.date),
        "lesson": r.lesson,
        "weekday": r.weekday,
        "period": r.period,
        "studentId": r.student_id,
        "status": r.status.as_str(),
    })
}
