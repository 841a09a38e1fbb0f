//! Submission log: append-only attendance records.

use crate::dates::{format_date, parse_date};
use crate::error::{LedgerError, LedgerResult};
use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::Connection;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            _ => Err(LedgerError::validation(format!(
                "status must be Present or Absent, got {:?}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub date: NaiveDate,
    /// Lesson name at the time of submission; not kept in sync with renames.
    pub lesson: String,
    pub weekday: String,
    pub period: String,
    pub student_id: String,
    pub status: AttendanceStatus,
}

/// Destination for finalized batches.
pub trait SubmissionSink {
    /// Persists the whole batch or nothing.
    fn append(&mut self, records: &[SubmissionRecord]) -> LedgerResult<()>;
}

impl SubmissionSink for Connection {
    fn append(&mut self, records: &[SubmissionRecord]) -> LedgerResult<()> {
        append(self, records)
    }
}

impl SubmissionSink for &Connection {
    fn append(&mut self, records: &[SubmissionRecord]) -> LedgerResult<()> {
        append(*self, records)
    }
}

pub(crate) fn insert_all(conn: &Connection, records: &[SubmissionRecord]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO submissions(date, lesson, weekday, period, student_id, status)
         VALUES(?, ?, ?, ?, ?, ?)",
    )?;
    for r in records {
        stmt.execute((
            format_date(r.date),
            &r.lesson,
            &r.weekday,
            &r.period,
            &r.student_id,
            r.status.as_str(),
        ))?;
    }
    Ok(())
}

pub fn append(conn: &Connection, records: &[SubmissionRecord]) -> LedgerResult<()> {
    if records.is_empty() {
        return Ok(());
    }
    let tx = conn.unchecked_transaction()?;
    insert_all(&tx, records)?;
    tx.commit()?;
    info!(rows = records.len(), "submissions appended");
    Ok(())
}

pub fn all(conn: &Connection) -> LedgerResult<Vec<SubmissionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT date, lesson, weekday, period, student_id, status
         FROM submissions
         ORDER BY id",
    )?;
    let records = stmt
        .query_map([], |row| {
            let raw_date: String = row.get(0)?;
            let date = parse_date(&raw_date).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    Type::Text,
                    format!("unparseable date {:?}", raw_date).into(),
                )
            })?;
            let raw_status: String = row.get(5)?;
            let status = raw_status.parse::<AttendanceStatus>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.to_string().into())
            })?;
            Ok(SubmissionRecord {
                date,
                lesson: row.get(1)?,
                weekday: row.get(2)?,
                period: row.get(3)?,
                student_id: row.get(4)?,
                status,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn count(conn: &Connection) -> LedgerResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM submissions", [], |r| r.get(0))?)
}

/// One lesson instance as seen in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub date: NaiveDate,
    pub lesson: String,
    pub weekday: String,
    pub period: String,
    pub present: Vec<String>,
    pub absent: Vec<String>,
}

impl SessionSummary {
    pub fn full_presence(&self) -> bool {
        self.absent.is_empty()
    }
}

/// Groups records by (date, lesson, weekday, period) in first-appearance order.
pub fn summarize(records: &[SubmissionRecord]) -> Vec<SessionSummary> {
    let mut out: Vec<SessionSummary> = Vec::new();
    let mut index: HashMap<(NaiveDate, &str, &str, &str), usize> = HashMap::new();
    for r in records {
        let key = (r.date, r.lesson.as_str(), r.weekday.as_str(), r.period.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            out.push(SessionSummary {
                date: r.date,
                lesson: r.lesson.clone(),
                weekday: r.weekday.clone(),
                period: r.period.clone(),
                present: Vec::new(),
                absent: Vec::new(),
            });
            out.len() - 1
        });
        match r.status {
            AttendanceStatus::Present => out[slot].present.push(r.student_id.clone()),
            AttendanceStatus::Absent => out[slot].absent.push(r.student_id.clone()),
        }
    }
    out
}

pub(crate) fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub const EXPORT_HEADER: &str = "Date,Lesson,Day,Period,Student ID,Status";

/// Writes every record to `out` as CSV; returns the number of data rows.
pub fn export_csv(conn: &Connection, out: &Path) -> anyhow::Result<usize> {
    let records = all(conn).context("failed to read submissions")?;
    let mut csv = String::from(EXPORT_HEADER);
    csv.push('\n');
    for r in &records {
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            format_date(r.date),
            csv_quote(&r.lesson),
            csv_quote(&r.weekday),
            csv_quote(&r.period),
            csv_quote(&r.student_id),
            r.status.as_str()
        ));
    }
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }
    std::fs::write(out, csv)
        .with_context(|| format!("failed to write {}", out.to_string_lossy()))?;
    info!(rows = records.len(), path = %out.to_string_lossy(), "submissions exported");
    Ok(records.len())
}
