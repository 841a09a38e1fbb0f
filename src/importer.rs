//! Reconciliation importer.
//!
//! Merges lesson, student or presence data from an external source into the
//! workspace store. Each kind has its own merge policy:
//! - lessons replace by name (last writer wins),
//! - students are appended only when absent,
//! - presence rows are appended as-is.
//!
//! Every source row is read and validated before the store is touched, and
//! the merge runs in a single transaction.

use crate::catalog::{self, Lesson, Weekday};
use crate::dates::parse_date;
use crate::db;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{self, AttendanceStatus, SubmissionRecord};
use crate::roster;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Lessons,
    Students,
    Presence,
}

impl ImportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportKind::Lessons => "lessons",
            ImportKind::Students => "students",
            ImportKind::Presence => "presence",
        }
    }

    /// Column names a source must provide, matched case-sensitively.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            ImportKind::Lessons => &["name", "weekday", "period", "begin_date", "end_date"],
            ImportKind::Students => &["student_id"],
            ImportKind::Presence => &["date", "lesson", "weekday", "period", "student_id", "status"],
        }
    }

    /// Table holding this kind in a peer store.
    fn peer_table(self) -> &'static str {
        match self {
            ImportKind::Lessons => "lessons",
            ImportKind::Students => "students",
            ImportKind::Presence => "submissions",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ImportKind::Lessons => {
                "Lessons are matched by name. A lesson already in the catalog is replaced \
                 by the imported row; new names are added. weekday accepts Mon..Sun \
                 (or the full/Japanese day name), dates are yyyy-MM-dd and begin_date \
                 must not be after end_date. An empty period is stored as N/A."
            }
            ImportKind::Students => {
                "Student ids already on the roster are skipped; new ids are appended in \
                 source order. A peer store must provide a students table with a \
                 student_id column."
            }
            ImportKind::Presence => {
                "Every row is appended to the submission log as-is, without checking the \
                 lesson catalog or roster. date is yyyy-MM-dd and status is Present or \
                 Absent."
            }
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "lessons" | "lesson" | "lesson_info" | "lessonInfo" => Ok(ImportKind::Lessons),
            "students" | "student" | "student_info" | "studentInfo" => Ok(ImportKind::Students),
            "presence" | "presence_info" | "presenceInfo" => Ok(ImportKind::Presence),
            other => Err(LedgerError::validation(format!(
                "unknown import kind: {:?}",
                other
            ))),
        }
    }
}

/// Where imported rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// Another SQLite store with this ledger's table layout.
    PeerStore(PathBuf),
    /// A CSV file with a header row naming the columns.
    Tabular(PathBuf),
}

impl ImportSource {
    /// Reads the required fields for `kind`, failing before any row is
    /// returned when a field is missing.
    pub fn read(&self, kind: ImportKind) -> LedgerResult<SourceTable> {
        match self {
            ImportSource::PeerStore(p) => read_peer_store(p, kind),
            ImportSource::Tabular(p) => read_tabular(p, kind),
        }
    }
}

impl fmt::Display for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::PeerStore(p) => write!(f, "peer store {}", p.to_string_lossy()),
            ImportSource::Tabular(p) => write!(f, "table {}", p.to_string_lossy()),
        }
    }
}

/// Rows projected onto a kind's required fields, in that order.
#[derive(Debug, Clone)]
pub struct SourceTable {
    fields: &'static [&'static str],
    rows: Vec<SourceRow>,
}

#[derive(Debug, Clone)]
pub struct SourceRow {
    /// 1-based position in the source, for error messages.
    pub line: usize,
    values: Vec<String>,
}

impl SourceTable {
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    pub fn value<'a>(&self, row: &'a SourceRow, field: &str) -> &'a str {
        self.fields
            .iter()
            .position(|f| *f == field)
            .and_then(|i| row.values.get(i))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

fn source_err(path: &Path, e: impl fmt::Display) -> LedgerError {
    LedgerError::SourceRead(format!("{}: {}", path.to_string_lossy(), e))
}

fn value_to_text(v: Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}

fn read_peer_store(path: &Path, kind: ImportKind) -> LedgerResult<SourceTable> {
    if !path.is_file() {
        return Err(source_err(path, "file not found"));
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| source_err(path, e))?;
    let fields = kind.required_fields();
    let table = kind.peer_table();

    // A non-database file only fails on first query.
    if !db::table_exists(&conn, table).map_err(|e| source_err(path, e))? {
        return Err(LedgerError::Schema {
            missing: fields.iter().map(|f| format!("{}.{}", table, f)).collect(),
        });
    }
    let mut missing = Vec::new();
    for f in fields {
        if !db::table_has_column(&conn, table, f).map_err(|e| source_err(path, e))? {
            missing.push(format!("{}.{}", table, f));
        }
    }
    if !missing.is_empty() {
        return Err(LedgerError::Schema { missing });
    }

    let order = if kind == ImportKind::Students
        && db::table_has_column(&conn, table, "sort_order").map_err(|e| source_err(path, e))?
    {
        "sort_order, rowid"
    } else {
        "rowid"
    };
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {}",
        fields.join(", "),
        table,
        order
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| source_err(path, e))?;
    let rows = stmt
        .query_map([], |r| {
            let mut values = Vec::with_capacity(fields.len());
            for i in 0..fields.len() {
                values.push(value_to_text(r.get::<_, Value>(i)?));
            }
            Ok(values)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| source_err(path, e))?;

    Ok(SourceTable {
        fields,
        rows: rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| SourceRow { line: i + 1, values })
            .collect(),
    })
}

/// One CSV record and the 1-based line it starts on.
struct CsvRecord {
    line: usize,
    cells: Vec<String>,
}

fn push_record(out: &mut Vec<CsvRecord>, line: usize, cells: Vec<String>, quoted: bool) {
    // Whitespace-only lines between records carry no data.
    if !quoted && cells.len() == 1 && cells[0].trim().is_empty() {
        return;
    }
    out.push(CsvRecord { line, cells });
}

/// Splits `text` into records. Quoted cells may span lines; an unterminated
/// quote is an error naming the line its record starts on.
fn parse_csv(text: &str) -> Result<Vec<CsvRecord>, String> {
    let mut out = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut line = 1;
    let mut start = 1;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            '\n' if in_quotes => {
                buf.push('\n');
                line += 1;
            }
            ',' if !in_quotes => cells.push(std::mem::take(&mut buf)),
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' => {
                cells.push(std::mem::take(&mut buf));
                push_record(&mut out, start, std::mem::take(&mut cells), quoted);
                quoted = false;
                line += 1;
                start = line;
            }
            _ => buf.push(ch),
        }
    }
    if in_quotes {
        return Err(format!("unterminated quote in record starting on line {}", start));
    }
    if !buf.is_empty() || !cells.is_empty() || quoted {
        cells.push(buf);
        push_record(&mut out, start, cells, quoted);
    }
    Ok(out)
}

fn read_tabular(path: &Path, kind: ImportKind) -> LedgerResult<SourceTable> {
    let bytes = std::fs::read(path).map_err(|e| source_err(path, e))?;
    let text = String::from_utf8(bytes).map_err(|_| source_err(path, "not valid UTF-8 text"))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    let fields = kind.required_fields();

    let mut records = parse_csv(text)
        .map_err(|e| source_err(path, e))?
        .into_iter();
    let header: Vec<String> = records
        .next()
        .map(|r| r.cells.into_iter().map(|h| h.trim().to_string()).collect())
        .unwrap_or_default();

    let mut columns = Vec::with_capacity(fields.len());
    let mut missing = Vec::new();
    for f in fields {
        match header.iter().position(|h| h == f) {
            Some(i) => columns.push(i),
            None => missing.push(f.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(LedgerError::Schema { missing });
    }

    let rows = records
        .map(|r| SourceRow {
            line: r.line,
            values: columns
                .iter()
                .map(|&c| r.cells.get(c).cloned().unwrap_or_default())
                .collect(),
        })
        .collect();
    Ok(SourceTable { fields, rows })
}

fn row_err(row: &SourceRow, e: LedgerError) -> LedgerError {
    match e {
        LedgerError::Validation(m) => LedgerError::validation(format!("row {}: {}", row.line, m)),
        other => other,
    }
}

fn lessons_from(table: &SourceTable) -> LedgerResult<Vec<Lesson>> {
    table
        .rows()
        .iter()
        .map(|row| {
            let parse = || -> LedgerResult<Lesson> {
                let date = |field: &str| {
                    let raw = table.value(row, field);
                    parse_date(raw).ok_or_else(|| {
                        LedgerError::validation(format!("{} is not a date: {:?}", field, raw))
                    })
                };
                Lesson {
                    name: table.value(row, "name").to_string(),
                    weekday: table.value(row, "weekday").parse::<Weekday>()?,
                    period: table.value(row, "period").to_string(),
                    begin_date: date("begin_date")?,
                    end_date: date("end_date")?,
                }
                .validated()
            };
            parse().map_err(|e| row_err(row, e))
        })
        .collect()
}

fn student_ids_from(table: &SourceTable) -> LedgerResult<Vec<String>> {
    table
        .rows()
        .iter()
        .map(|row| {
            let id = table.value(row, "student_id").trim();
            if id.is_empty() {
                return Err(LedgerError::validation(format!(
                    "row {}: student_id must not be empty",
                    row.line
                )));
            }
            Ok(id.to_string())
        })
        .collect()
}

fn records_from(table: &SourceTable) -> LedgerResult<Vec<SubmissionRecord>> {
    table
        .rows()
        .iter()
        .map(|row| {
            let parse = || -> LedgerResult<SubmissionRecord> {
                let raw_date = table.value(row, "date");
                let date = parse_date(raw_date).ok_or_else(|| {
                    LedgerError::validation(format!("date is not a date: {:?}", raw_date))
                })?;
                Ok(SubmissionRecord {
                    date,
                    lesson: table.value(row, "lesson").trim().to_string(),
                    weekday: table.value(row, "weekday").trim().to_string(),
                    period: table.value(row, "period").trim().to_string(),
                    student_id: table.value(row, "student_id").trim().to_string(),
                    status: table.value(row, "status").parse::<AttendanceStatus>()?,
                })
            };
            parse().map_err(|e| row_err(row, e))
        })
        .collect()
}

/// Merges `source` into the store under `kind`'s policy.
///
/// Returns the number of rows processed, except for students where it is
/// the number of ids newly added to the roster.
pub fn import(conn: &Connection, kind: ImportKind, source: &ImportSource) -> LedgerResult<usize> {
    let table = source.read(kind)?;
    debug!(%kind, %source, rows = table.len(), "import source read");

    let count = match kind {
        ImportKind::Lessons => {
            let lessons = lessons_from(&table)?;
            let tx = conn.unchecked_transaction()?;
            for lesson in &lessons {
                catalog::write_by_name(&tx, lesson)?;
            }
            tx.commit()?;
            lessons.len()
        }
        ImportKind::Students => {
            let ids = student_ids_from(&table)?;
            let tx = conn.unchecked_transaction()?;
            let added = roster::append_missing(&tx, &ids)?;
            tx.commit()?;
            added
        }
        ImportKind::Presence => {
            let records = records_from(&table)?;
            let tx = conn.unchecked_transaction()?;
            ledger::insert_all(&tx, &records)?;
            tx.commit()?;
            records.len()
        }
    };

    info!(%kind, %source, count, "import applied");
    Ok(count)
}
