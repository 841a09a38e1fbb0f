//! Student roster: ordered, duplicate-free student ids.

use crate::error::{LedgerError, LedgerResult};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentRoster {
    ids: Vec<String>,
}

impl StudentRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    pub fn add(&mut self, id: &str) -> LedgerResult<()> {
        let id = clean_id(id)?;
        if self.contains(&id) {
            return Err(LedgerError::validation(format!(
                "student id {:?} already exists",
                id
            )));
        }
        self.ids.push(id);
        Ok(())
    }

    /// Replaces `old` with `new` in place.
    pub fn rename(&mut self, old: &str, new: &str) -> LedgerResult<()> {
        let new = clean_id(new)?;
        let Some(pos) = self.ids.iter().position(|s| s == old.trim()) else {
            return Err(LedgerError::validation(format!(
                "student id {:?} not found",
                old
            )));
        };
        if self.ids[pos] == new {
            return Ok(());
        }
        if self.contains(&new) {
            return Err(LedgerError::validation(format!(
                "student id {:?} already exists",
                new
            )));
        }
        self.ids[pos] = new;
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> LedgerResult<()> {
        let Some(pos) = self.ids.iter().position(|s| s == id.trim()) else {
            return Err(LedgerError::validation(format!(
                "student id {:?} not found",
                id
            )));
        };
        self.ids.remove(pos);
        Ok(())
    }

    /// Appends ids not yet present, in order; returns how many were new.
    pub fn merge<I, S>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for id in incoming {
            let id = id.as_ref().trim();
            if id.is_empty() || self.contains(id) {
                continue;
            }
            self.ids.push(id.to_string());
            added += 1;
        }
        added
    }
}

impl<S: Into<String>> FromIterator<S> for StudentRoster {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut roster = StudentRoster::new();
        for id in iter {
            let id: String = id.into();
            roster.merge([id]);
        }
        roster
    }
}

fn clean_id(id: &str) -> LedgerResult<String> {
    let t = id.trim();
    if t.is_empty() {
        return Err(LedgerError::validation("student id must not be empty"));
    }
    Ok(t.to_string())
}

pub fn load(conn: &Connection) -> LedgerResult<StudentRoster> {
    let mut stmt = conn.prepare("SELECT student_id FROM students ORDER BY sort_order, rowid")?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StudentRoster { ids })
}

/// Rewrites the stored roster to match `roster` exactly.
fn store(conn: &Connection, roster: &StudentRoster) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM students", [])?;
    let mut stmt = conn.prepare("INSERT INTO students(student_id, sort_order) VALUES(?, ?)")?;
    for (i, id) in roster.ids.iter().enumerate() {
        stmt.execute((id, i as i64))?;
    }
    Ok(())
}

fn mutate(
    conn: &Connection,
    f: impl FnOnce(&mut StudentRoster) -> LedgerResult<()>,
) -> LedgerResult<StudentRoster> {
    let tx = conn.unchecked_transaction()?;
    let mut roster = load(&tx)?;
    f(&mut roster)?;
    store(&tx, &roster)?;
    tx.commit()?;
    Ok(roster)
}

pub fn add(conn: &Connection, id: &str) -> LedgerResult<StudentRoster> {
    let roster = mutate(conn, |r| r.add(id))?;
    info!(student = id.trim(), "student added");
    Ok(roster)
}

pub fn rename(conn: &Connection, old: &str, new: &str) -> LedgerResult<StudentRoster> {
    let roster = mutate(conn, |r| r.rename(old, new))?;
    info!(from = old.trim(), to = new.trim(), "student renamed");
    Ok(roster)
}

pub fn remove(conn: &Connection, id: &str) -> LedgerResult<StudentRoster> {
    let roster = mutate(conn, |r| r.remove(id))?;
    info!(student = id.trim(), "student removed");
    Ok(roster)
}

/// Appends ids missing from the stored roster, keeping source order.
/// Callers own the transaction.
pub(crate) fn append_missing(conn: &Connection, ids: &[String]) -> rusqlite::Result<usize> {
    let mut next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students",
        [],
        |r| r.get(0),
    )?;
    let mut added = 0;
    for id in ids {
        let exists = conn
            .query_row("SELECT 1 FROM students WHERE student_id = ?", [id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if exists {
            continue;
        }
        conn.execute(
            "INSERT INTO students(student_id, sort_order) VALUES(?, ?)",
            (id, next),
        )?;
        next += 1;
        added += 1;
    }
    Ok(added)
}
