//! Lesson catalog: the set of recurring lessons keyed by unique name.

use crate::dates::{format_date, parse_date};
use crate::error::{LedgerError, LedgerResult};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::info;

pub const DEFAULT_PERIOD: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        }
    }

    fn long_name(self) -> &'static str {
        match self {
            Weekday::Mon => "monday",
            Weekday::Tue => "tuesday",
            Weekday::Wed => "wednesday",
            Weekday::Thu => "thursday",
            Weekday::Fri => "friday",
            Weekday::Sat => "saturday",
            Weekday::Sun => "sunday",
        }
    }

    fn kanji(self) -> char {
        match self {
            Weekday::Mon => '月',
            Weekday::Tue => '火',
            Weekday::Wed => '水',
            Weekday::Thu => '木',
            Weekday::Fri => '金',
            Weekday::Sat => '土',
            Weekday::Sun => '日',
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = LedgerError;

    /// Accepts `Mon`, `monday`, `月`, `月曜`, `月曜日` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let lower = t.to_ascii_lowercase();
        for day in Weekday::ALL {
            if lower == day.as_str().to_ascii_lowercase() || lower == day.long_name() {
                return Ok(day);
            }
            let k = day.kanji();
            let mut chars = t.chars();
            if chars.next() == Some(k) {
                let rest: String = chars.collect();
                if rest.is_empty() || rest == "曜" || rest == "曜日" {
                    return Ok(day);
                }
            }
        }
        Err(LedgerError::validation(format!("unknown weekday: {:?}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub name: String,
    pub weekday: Weekday,
    pub period: String,
    pub begin_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Lesson {
    pub fn new(
        name: impl Into<String>,
        weekday: Weekday,
        period: impl Into<String>,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Lesson {
            name: name.into(),
            weekday,
            period: period.into(),
            begin_date,
            end_date,
        }
    }

    /// Trims text fields and fills the default period, then checks the
    /// invariants a stored lesson must hold.
    pub fn validated(&self) -> LedgerResult<Lesson> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::validation("lesson name must not be empty"));
        }
        if self.begin_date > self.end_date {
            return Err(LedgerError::validation(format!(
                "begin date {} is after end date {}",
                format_date(self.begin_date),
                format_date(self.end_date)
            )));
        }
        let period = match self.period.trim() {
            "" => DEFAULT_PERIOD.to_string(),
            p => p.to_string(),
        };
        Ok(Lesson {
            name,
            weekday: self.weekday,
            period,
            begin_date: self.begin_date,
            end_date: self.end_date,
        })
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.begin_date <= date && date <= self.end_date
    }
}

fn text_column<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unparseable value {:?}", raw).into(),
        )
    })
}

fn lesson_from_row(row: &Row<'_>) -> rusqlite::Result<Lesson> {
    Ok(Lesson {
        name: row.get(0)?,
        weekday: text_column(row, 1, |s| s.parse::<Weekday>().ok())?,
        period: row.get(2)?,
        begin_date: text_column(row, 3, parse_date)?,
        end_date: text_column(row, 4, parse_date)?,
    })
}

fn lesson_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM lessons WHERE name = ?", [name], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

/// Inserts `lesson`, replacing every field of an existing row with the same
/// name. Callers own the transaction and must pass a validated lesson.
pub(crate) fn write_by_name(conn: &Connection, lesson: &Lesson) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO lessons(name, weekday, period, begin_date, end_date)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET
           weekday = excluded.weekday,
           period = excluded.period,
           begin_date = excluded.begin_date,
           end_date = excluded.end_date",
        (
            &lesson.name,
            lesson.weekday.as_str(),
            &lesson.period,
            format_date(lesson.begin_date),
            format_date(lesson.end_date),
        ),
    )?;
    Ok(())
}

/// Creates or replaces a lesson.
///
/// With `name_key` naming an existing lesson, every field of that row is
/// replaced, including the name itself. Otherwise the lesson is written by
/// its own name. Returns the lesson as stored.
pub fn upsert(conn: &Connection, name_key: Option<&str>, lesson: &Lesson) -> LedgerResult<Lesson> {
    let lesson = lesson.validated()?;
    let name_key = name_key.map(str::trim).filter(|k| !k.is_empty());

    let tx = conn.unchecked_transaction()?;
    match name_key {
        Some(key) if lesson_exists(&tx, key)? => {
            if key != lesson.name && lesson_exists(&tx, &lesson.name)? {
                return Err(LedgerError::validation(format!(
                    "cannot rename {:?}: lesson {:?} already exists",
                    key, lesson.name
                )));
            }
            tx.execute(
                "UPDATE lessons
                 SET name = ?, weekday = ?, period = ?, begin_date = ?, end_date = ?
                 WHERE name = ?",
                (
                    &lesson.name,
                    lesson.weekday.as_str(),
                    &lesson.period,
                    format_date(lesson.begin_date),
                    format_date(lesson.end_date),
                    key,
                ),
            )?;
            if key != lesson.name {
                info!(from = key, to = %lesson.name, "lesson renamed");
            }
        }
        _ => write_by_name(&tx, &lesson)?,
    }
    tx.commit()?;

    info!(lesson = %lesson.name, "lesson saved");
    Ok(lesson)
}

/// Snapshot of the catalog keyed by lesson name.
pub fn list(conn: &Connection) -> LedgerResult<BTreeMap<String, Lesson>> {
    let mut stmt =
        conn.prepare("SELECT name, weekday, period, begin_date, end_date FROM lessons")?;
    let lessons = stmt
        .query_map([], lesson_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lessons.into_iter().map(|l| (l.name.clone(), l)).collect())
}

pub fn get(conn: &Connection, name: &str) -> LedgerResult<Option<Lesson>> {
    let lesson = conn
        .query_row(
            "SELECT name, weekday, period, begin_date, end_date FROM lessons WHERE name = ?",
            [name],
            lesson_from_row,
        )
        .optional()?;
    Ok(lesson)
}
