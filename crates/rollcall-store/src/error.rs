use rusqlite::ffi::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The database stayed locked past the busy timeout. Callers should
    /// back off and retry rather than treat this as fatal.
    #[error("database is busy")]
    Busy,
    #[error("invalid date stored in database: {0}")]
    InvalidDate(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StoreError::Busy
            }
            _ => StoreError::Sqlite(err),
        }
    }
}
