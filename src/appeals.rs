//! Attendance appeals: a user disputes a record, a teacher approves or rejects it.
//! The decision is delivered to the filer as a notification.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::model::{format_timestamp, parse_stored_timestamp};
use crate::notifications;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

impl AppealStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppealStatus::Pending => "pending",
            AppealStatus::Approved => "approved",
            AppealStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for AppealStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppealStatus::Pending),
            "approved" => Ok(AppealStatus::Approved),
            "rejected" => Ok(AppealStatus::Rejected),
            other => Err(AppError::Validation(format!("unknown appeal status {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appeal {
    pub id: i64,
    pub user_id: i64,
    pub attendance_id: Option<i64>,
    pub reason: String,
    pub status: AppealStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAppeal {
    #[serde(default)]
    pub attendance_id: Option<i64>,
    #[serde(default)]
    pub reason: String,
}

/// Which appeals a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppealScope {
    All,
    FiledBy(i64),
}

const APPEAL_COLUMNS: &str =
    "id, user_id, attendance_id, reason, status, created_at, decided_at, decided_by";

type AppealRow = (i64, i64, Option<i64>, String, String, String, Option<String>, Option<i64>);

fn appeal_row(r: &Row<'_>) -> rusqlite::Result<AppealRow> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
        r.get(7)?,
    ))
}

fn appeal_from(row: AppealRow) -> AppResult<Appeal> {
    let (id, user_id, attendance_id, reason, status, created_at, decided_at, decided_by) = row;
    Ok(Appeal {
        id,
        user_id,
        attendance_id,
        reason,
        status: status.parse()?,
        created_at: parse_stored_timestamp(&created_at)?,
        decided_at: decided_at.as_deref().map(parse_stored_timestamp).transpose()?,
        decided_by,
    })
}

pub fn get_appeal(conn: &Connection, id: i64) -> AppResult<Appeal> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM appeals WHERE id = ?", APPEAL_COLUMNS),
            [id],
            appeal_row,
        )
        .optional()?;
    match row {
        Some(row) => appeal_from(row),
        None => Err(AppError::NotFound(format!("appeal {} not found", id))),
    }
}

/// A student may appeal only records of their linked student.
pub fn file_appeal(conn: &Connection, filer: &Session, input: &NewAppeal) -> AppResult<i64> {
    let reason = input.reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation("missing reason".to_string()));
    }
    if let Some(record_id) = input.attendance_id {
        let owner = conn
            .query_row(
                "SELECT student_id FROM attendance WHERE id = ?",
                [record_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .ok_or_else(|| {
                AppError::NotFound(format!("attendance record {} not found", record_id))
            })?;
        filer.require_view_of(owner)?;
    }

    conn.execute(
        "INSERT INTO appeals(user_id, attendance_id, reason, status, created_at)
         VALUES(?, ?, ?, 'pending', ?)",
        (
            filer.user_id,
            input.attendance_id,
            reason,
            format_timestamp(&Utc::now()),
        ),
    )?;
    let id = conn.last_insert_rowid();
    info!(appeal_id = id, user_id = filer.user_id, "appeal filed");
    Ok(id)
}

/// Newest first.
pub fn list_appeals(conn: &Connection, scope: AppealScope) -> AppResult<Vec<Appeal>> {
    let rows = match scope {
        AppealScope::All => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM appeals ORDER BY created_at DESC, id DESC",
                APPEAL_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], appeal_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        AppealScope::FiledBy(user_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM appeals WHERE user_id = ? ORDER BY created_at DESC, id DESC",
                APPEAL_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id], appeal_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    rows.into_iter().map(appeal_from).collect()
}

/// Settles a pending appeal and notifies the filer in the same transaction.
/// A settled appeal cannot be decided again.
pub fn decide_appeal(
    conn: &Connection,
    id: i64,
    decision: AppealStatus,
    decided_by: Option<i64>,
) -> AppResult<Appeal> {
    if decision == AppealStatus::Pending {
        return Err(AppError::Validation("decision must be approved or rejected".to_string()));
    }

    let tx = conn.unchecked_transaction()?;
    let n = tx.execute(
        "UPDATE appeals SET status = ?, decided_at = ?, decided_by = ?
         WHERE id = ? AND status = 'pending'",
        (
            decision.as_str(),
            format_timestamp(&Utc::now()),
            decided_by,
            id,
        ),
    )?;
    if n == 0 {
        let current = get_appeal(&tx, id)?;
        return Err(AppError::Conflict(format!(
            "appeal {} is already {}",
            id,
            current.status.as_str()
        )));
    }
    let appeal = get_appeal(&tx, id)?;
    notifications::insert(
        &tx,
        appeal.user_id,
        &format!("Appeal {}", decision.as_str()),
        &format!("Your attendance appeal #{} was {}.", id, decision.as_str()),
        "appeal",
    )?;
    tx.commit()?;

    info!(appeal_id = id, status = decision.as_str(), ?decided_by, "appeal decided");
    Ok(appeal)
}
