//! rollcall-store — SQLite persistence for attendance and contacts.
//!
//! One [`Store`] handle wraps one connection. Components that run
//! concurrently (the capture loop, the report scheduler, admin tooling)
//! each open their own handle against the same file; WAL journaling plus
//! the `UNIQUE(name, date, hour)` constraint keep marking correct across
//! connections and processes.

pub mod attendance;
pub mod contacts;
mod db;
mod error;
pub mod validate;

pub use attendance::{AttendanceRecord, AttendanceStat, MarkOutcome, PurgeFilter, RejectReason};
pub use contacts::Contact;
pub use db::Store;
pub use error::StoreError;
