//! Attendance store — append-only per (name, date, hour) facts.
//!
//! Marking is idempotent: the `UNIQUE(name, date, hour)` constraint is the
//! arbiter, so exactly one of any number of concurrent writers records the
//! fact and the rest observe `AlreadyMarked`, across threads and processes.

use crate::db::Store;
use crate::error::StoreError;
use chrono::NaiveDate;
use rusqlite::ffi::ErrorCode;
use rusqlite::params;
use serde::Serialize;
use std::collections::HashSet;

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 50;
const DATE_FMT: &str = "%Y-%m-%d";

/// Result of a mark attempt. All outcomes are ordinary values; callers
/// must handle each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// A new record was created.
    Marked,
    /// A record for this (name, date, hour) already existed.
    AlreadyMarked,
    /// The request never reached the table.
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Name is empty, too short, or too long after trimming.
    InvalidName,
    /// No contact row exists for this name.
    UnknownContact,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub date: NaiveDate,
    pub hour: u32,
}

/// Per-student attendance summary.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceStat {
    pub name: String,
    pub present: u32,
    /// Percent of all distinct (date, hour) sessions attended, rounded to
    /// two decimals.
    pub percentage: f64,
}

/// Which records a purge removes. Deleting everything requires the
/// explicit `All` variant; there is no filterless default.
#[derive(Debug, Clone)]
pub enum PurgeFilter {
    ByName(String),
    ByDate(NaiveDate),
    ByNameAndDate { name: String, date: NaiveDate },
    All,
}

impl Store {
    /// Record attendance for `name` at (`date`, `hour`).
    ///
    /// Validation order: name shape, then contact existence, then the
    /// insert itself, whose uniqueness violation maps to `AlreadyMarked`.
    pub fn mark(&self, name: &str, date: NaiveDate, hour: u32) -> Result<MarkOutcome, StoreError> {
        let name = name.trim();
        let chars = name.chars().count();
        if chars < NAME_MIN_CHARS || chars > NAME_MAX_CHARS {
            return Ok(MarkOutcome::Rejected(RejectReason::InvalidName));
        }

        if self.contact(name)?.is_none() {
            return Ok(MarkOutcome::Rejected(RejectReason::UnknownContact));
        }

        let result = self.conn.execute(
            "INSERT INTO attendance (name, date, hour) VALUES (?1, ?2, ?3)",
            params![name, date.format(DATE_FMT).to_string(), hour],
        );

        match result {
            Ok(_) => {
                tracing::info!(name, %date, hour, "attendance marked");
                Ok(MarkOutcome::Marked)
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Ok(MarkOutcome::AlreadyMarked)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All attendance records, most recent first (date desc, hour desc).
    pub fn records(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, date, hour FROM attendance ORDER BY date DESC, hour DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (name, date, hour) = row?;
            records.push(AttendanceRecord {
                name,
                date: parse_date(&date)?,
                hour,
            });
        }
        Ok(records)
    }

    /// For each requested hour, the contacts with no record at
    /// (`date`, hour). Names containing path separators are excluded from
    /// the contact universe; such rows are malformed historical data.
    pub fn absentees(
        &self,
        date: NaiveDate,
        hours: &[u32],
    ) -> Result<Vec<(u32, String)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM contacts
             WHERE name NOT LIKE '%/%' AND name NOT LIKE '%\\%'",
        )?;
        let all: HashSet<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let date_str = date.format(DATE_FMT).to_string();
        let mut absences = Vec::new();
        let mut present_stmt = self
            .conn
            .prepare("SELECT name FROM attendance WHERE date = ?1 AND hour = ?2")?;

        for &hour in hours {
            let present: HashSet<String> = present_stmt
                .query_map(params![date_str, hour], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            let mut absent: Vec<&String> = all.difference(&present).collect();
            absent.sort();
            absences.extend(absent.into_iter().map(|name| (hour, name.clone())));
        }

        Ok(absences)
    }

    /// Delete attendance records matching the filter. Returns the number
    /// of rows removed.
    pub fn purge(&self, filter: PurgeFilter) -> Result<usize, StoreError> {
        let n = match &filter {
            PurgeFilter::ByName(name) => self
                .conn
                .execute("DELETE FROM attendance WHERE name = ?1", params![name])?,
            PurgeFilter::ByDate(date) => self.conn.execute(
                "DELETE FROM attendance WHERE date = ?1",
                params![date.format(DATE_FMT).to_string()],
            )?,
            PurgeFilter::ByNameAndDate { name, date } => self.conn.execute(
                "DELETE FROM attendance WHERE name = ?1 AND date = ?2",
                params![name, date.format(DATE_FMT).to_string()],
            )?,
            PurgeFilter::All => self.conn.execute("DELETE FROM attendance", [])?,
        };
        tracing::info!(?filter, deleted = n, "attendance purged");
        Ok(n)
    }

    /// Per-student present counts and percentages over the total number of
    /// distinct (date, hour) sessions observed. With no sessions at all the
    /// divisor is 1, so percentages are simply zero rather than undefined.
    pub fn stats(&self) -> Result<(Vec<AttendanceStat>, u32), StoreError> {
        let total: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM (SELECT DISTINCT date, hour FROM attendance)",
            [],
            |row| row.get(0),
        )?;
        let divisor = total.max(1);

        let mut stmt = self.conn.prepare(
            "SELECT name, COUNT(*) FROM attendance GROUP BY name ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;

        let mut stats = Vec::new();
        for row in rows {
            let (name, present) = row?;
            let percentage = (present as f64 / divisor as f64) * 100.0;
            stats.push(AttendanceStat {
                name,
                present,
                percentage: (percentage * 100.0).round() / 100.0,
            });
        }
        Ok((stats, total))
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, DATE_FMT).map_err(|_| StoreError::InvalidDate(s.to_string()))
}
