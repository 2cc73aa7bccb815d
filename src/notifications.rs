//! Per-user inbox. Teachers send; each user lists and acknowledges their own.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::model::{format_timestamp, parse_stored_timestamp};

pub const DEFAULT_KIND: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Recipient is a user id, or the account linked to a student id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewNotification {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

fn resolve_recipient(conn: &Connection, input: &NewNotification) -> AppResult<i64> {
    let found = match (input.user_id, input.student_id) {
        (Some(uid), _) => conn
            .query_row("SELECT id FROM users WHERE id = ?", [uid], |r| r.get::<_, i64>(0))
            .optional()?,
        (None, Some(sid)) => conn
            .query_row("SELECT id FROM users WHERE student_id = ?", [sid], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?,
        (None, None) => {
            return Err(AppError::Validation(
                "notification needs user_id or student_id".to_string(),
            ))
        }
    };
    found.ok_or_else(|| AppError::NotFound("recipient not found".to_string()))
}

pub(crate) fn insert(
    conn: &Connection,
    user_id: i64,
    title: &str,
    message: &str,
    kind: &str,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO notifications(user_id, title, message, kind, is_read, created_at)
         VALUES(?, ?, ?, ?, 0, ?)",
        (user_id, title, message, kind, format_timestamp(&Utc::now())),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn send_notification(conn: &Connection, input: &NewNotification) -> AppResult<i64> {
    let title = input.title.trim();
    let message = input.message.trim();
    if title.is_empty() || message.is_empty() {
        return Err(AppError::Validation("title and message are required".to_string()));
    }
    let kind = input
        .kind
        .as_deref()
        .map(|k| k.trim().to_ascii_lowercase())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| DEFAULT_KIND.to_string());
    let user_id = resolve_recipient(conn, input)?;
    let id = insert(conn, user_id, title, message, &kind)?;
    info!(notification_id = id, user_id, kind = %kind, "notification sent");
    Ok(id)
}

/// Newest first.
pub fn list_for_user(conn: &Connection, user_id: i64) -> AppResult<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, message, kind, is_read, created_at
         FROM notifications
         WHERE user_id = ?
         ORDER BY created_at DESC, id DESC",
    )?;
    let raw = stmt
        .query_map([user_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, i64>(5)?,
                r.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|(id, user_id, title, message, kind, is_read, created_at)| {
            Ok(Notification {
                id,
                user_id,
                title,
                message,
                kind,
                is_read: is_read != 0,
                created_at: parse_stored_timestamp(&created_at)?,
            })
        })
        .collect()
}

/// Someone else's notification reads as absent.
pub fn mark_read(conn: &Connection, user_id: i64, notification_id: i64) -> AppResult<()> {
    let n = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?",
        (notification_id, user_id),
    )?;
    if n == 0 {
        return Err(AppError::NotFound(format!(
            "notification {} not found",
            notification_id
        )));
    }
    Ok(())
}
