use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rusqlite::ErrorCode;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Stable, machine-readable error codes. Clients match on these, never on messages.
pub mod code {
    pub const VALIDATION: &str = "VALIDATION";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const PARTIAL_WRITE: &str = "PARTIAL_WRITE";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const STORAGE_UNAVAILABLE: &str = "STORAGE_UNAVAILABLE";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const INTERNAL: &str = "INTERNAL";
}

/// One rejected entry of a batch submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryFailure {
    pub index: usize,
    pub reference: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{} of {total} entries failed; nothing was written", .failures.len())]
    PartialWrite {
        total: usize,
        failures: Vec<EntryFailure>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("storage is unavailable")]
    StorageUnavailable,

    #[error("request timed out")]
    Timeout,

    #[error("internal error")]
    Internal,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => code::VALIDATION,
            AppError::NotFound(_) => code::NOT_FOUND,
            AppError::Conflict(_) => code::CONFLICT,
            AppError::PartialWrite { .. } => code::PARTIAL_WRITE,
            AppError::Unauthorized(_) => code::UNAUTHORIZED,
            AppError::Forbidden(_) => code::FORBIDDEN,
            AppError::StorageUnavailable => code::STORAGE_UNAVAILABLE,
            AppError::Timeout => code::TIMEOUT,
            AppError::Internal => code::INTERNAL,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PartialWrite { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::StorageUnavailable | AppError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::PartialWrite { total, failures } => Some(json!({
                "total": total,
                "failures": failures,
            })),
            _ => None,
        }
    }

    /// `{code, message, details?}` as carried by both transports.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(d) = self.details() {
            body["details"] = d;
        }
        body
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        // Engine text stays in the server log.
        error!(error = %e, "storage error");
        match &e {
            rusqlite::Error::SqliteFailure(f, _) => match f.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase
                | ErrorCode::ReadOnly => AppError::StorageUnavailable,
                ErrorCode::ConstraintViolation => match f.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        AppError::Conflict("record already exists".to_string())
                    }
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        AppError::NotFound("referenced record not found".to_string())
                    }
                    _ => AppError::Validation("record violates a storage constraint".to_string()),
                },
                _ => AppError::Internal,
            },
            _ => AppError::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, axum::Json(json!({ "error": self.to_json() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::StorageUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::PartialWrite { total: 1, failures: vec![] }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn unique_violation_is_conflict_without_engine_text() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE t(k TEXT UNIQUE); INSERT INTO t VALUES('a');")
            .expect("setup");
        let e: AppError = conn
            .execute("INSERT INTO t VALUES('a')", [])
            .expect_err("duplicate")
            .into();
        assert_eq!(e.code(), code::CONFLICT);
        assert!(!e.to_string().contains("UNIQUE"), "leaked: {}", e);
    }

    #[test]
    fn partial_write_carries_failures_in_details() {
        let e = AppError::PartialWrite {
            total: 3,
            failures: vec![EntryFailure {
                index: 1,
                reference: "R404".into(),
                code: code::NOT_FOUND,
                message: "student not found".into(),
            }],
        };
        let body = e.to_json();
        assert_eq!(body["code"], "PARTIAL_WRITE");
        assert_eq!(body["details"]["failures"][0]["reference"], "R404");
        assert_eq!(body["details"]["total"], 3);
    }

    #[test]
    fn unopenable_database_is_storage_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("no-such-dir").join("x.sqlite3");
        let e: AppError = rusqlite::Connection::open_with_flags(
            &missing,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE,
        )
        .expect_err("cannot open")
        .into();
        assert_eq!(e.code(), code::STORAGE_UNAVAILABLE);
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn busy_database_is_storage_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("busy.sqlite3");
        let holder = rusqlite::Connection::open(&path).expect("open");
        holder.execute_batch("CREATE TABLE t(k TEXT); BEGIN EXCLUSIVE;").expect("lock");
        let other = rusqlite::Connection::open(&path).expect("open second");
        other
            .busy_timeout(std::time::Duration::ZERO)
            .expect("no wait");
        let e: AppError = other
            .execute("INSERT INTO t VALUES('a')", [])
            .expect_err("busy")
            .into();
        assert_eq!(e.code(), code::STORAGE_UNAVAILABLE);
    }
}
