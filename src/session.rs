//! Submission session: collects present marks for one lesson on one date
//! and turns them into a complete Present/Absent batch.

use crate::catalog::Lesson;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{AttendanceStatus, SubmissionRecord, SubmissionSink};
use crate::roster::StudentRoster;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Finalized,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Finalized => "finalized",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionSession {
    lesson: Lesson,
    roster: StudentRoster,
    present: BTreeSet<String>,
    date: NaiveDate,
    state: SessionState,
}

impl SubmissionSession {
    pub fn open(lesson: Lesson, roster: StudentRoster, date: NaiveDate) -> LedgerResult<Self> {
        if lesson.name.trim().is_empty() {
            return Err(LedgerError::validation(
                "cannot open a session for a lesson without a name",
            ));
        }
        if !lesson.is_active_on(date) {
            warn!(lesson = %lesson.name, %date, "session date outside lesson window");
        }
        Ok(SubmissionSession {
            lesson,
            roster,
            present: BTreeSet::new(),
            date,
            state: SessionState::Open,
        })
    }

    pub fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    #[cfg(test)]
    pub(crate) fn lesson_mut(&mut self) -> &mut Lesson {
        &mut self.lesson
    }

    pub fn roster(&self) -> &StudentRoster {
        &self.roster
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn present(&self) -> &BTreeSet<String> {
        &self.present
    }

    pub fn is_present(&self, id: &str) -> bool {
        self.present.contains(id)
    }

    fn ensure_open(&self) -> LedgerResult<()> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Finalized => Err(LedgerError::validation("session already finalized")),
        }
    }

    /// Marks ids present; returns how many were not already marked.
    ///
    /// An empty selection or an id outside the roster rejects the whole call.
    pub fn mark_present<I, S>(&mut self, ids: I) -> LedgerResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_open()?;
        let ids: BTreeSet<String> = ids
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(LedgerError::validation("select at least one student"));
        }
        let unknown: Vec<&str> = ids
            .iter()
            .filter(|id| !self.roster.contains(id))
            .map(|s| s.as_str())
            .collect();
        if !unknown.is_empty() {
            return Err(LedgerError::validation(format!(
                "not on the roster: {}",
                unknown.join(", ")
            )));
        }

        let mut added = 0;
        for id in ids {
            if self.present.insert(id) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Builds one record per roster id, in roster order.
    pub fn records(&self) -> Vec<SubmissionRecord> {
        self.roster
            .ids()
            .iter()
            .map(|id| SubmissionRecord {
                date: self.date,
                lesson: self.lesson.name.clone(),
                weekday: self.lesson.weekday.as_str().to_string(),
                period: self.lesson.period.clone(),
                student_id: id.clone(),
                status: if self.present.contains(id) {
                    AttendanceStatus::Present
                } else {
                    AttendanceStatus::Absent
                },
            })
            .collect()
    }

    /// Appends the full batch to `sink`.
    ///
    /// On failure the session stays open with its marks, so the caller may retry.
    pub fn finalize<S: SubmissionSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> LedgerResult<Vec<SubmissionRecord>> {
        self.ensure_open()?;
        if self.lesson.name.trim().is_empty() {
            return Err(LedgerError::validation(
                "lesson name is empty; set a lesson name before finalizing",
            ));
        }
        let records = self.records();
        sink.append(&records)?;

        self.state = SessionState::Finalized;
        self.present.clear();
        info!(
            lesson = %self.lesson.name,
            date = %self.date,
            rows = records.len(),
            absent = records
                .iter()
                .filter(|r| r.status == AttendanceStatus::Absent)
                .count(),
            "session finalized"
        );
        Ok(records)
    }

    /// Discards the session without persisting anything.
    pub fn abandon(self) {
        info!(lesson = %self.lesson.name, marked = self.present.len(), "session abandoned");
    }
}
