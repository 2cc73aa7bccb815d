use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params_from_iter, types::Value, Connection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult, EntryFailure};
use crate::model::{
    date_end, date_start, format_timestamp, parse_date, parse_stored_timestamp, parse_timestamp,
    AttendanceRecord, AttendanceStatus, NewAttendance,
};
use crate::students;

fn required_class_id(raw: &str) -> AppResult<String> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(AppError::Validation("missing class_id".to_string()));
    }
    Ok(t.to_string())
}

fn insert_record(
    conn: &Connection,
    student_id: i64,
    class_id: &str,
    status: AttendanceStatus,
    ts: &DateTime<Utc>,
    batch_id: Option<&str>,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO attendance(student_id, class_id, status, timestamp, batch_id)
         VALUES(?, ?, ?, ?, ?)",
        (student_id, class_id, status.as_str(), format_timestamp(ts), batch_id),
    )?;
    Ok(conn.last_insert_rowid())
}

/// Records one attendance event. The student must exist; nothing is written otherwise.
pub fn record_attendance(conn: &Connection, input: &NewAttendance) -> AppResult<i64> {
    let student_id = input
        .student_id
        .ok_or_else(|| AppError::Validation("missing student_id".to_string()))?;
    let class_id = required_class_id(&input.class_id)?;
    let status: AttendanceStatus = input.status.parse()?;
    let ts = match input.timestamp.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => parse_timestamp(t)?,
        _ => Utc::now(),
    };

    students::require_student(conn, student_id)?;
    let id = insert_record(conn, student_id, &class_id, status, &ts, None)?;
    info!(record_id = id, student_id, class_id = %class_id, status = %status, "attendance recorded");
    Ok(id)
}

/// Inclusive bounds on the history query. A bare-date `to` covers that whole day.
#[derive(Debug, Clone, Default)]
pub struct HistoryRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|t| !t.is_empty())
}

impl HistoryRange {
    pub fn parse(from: Option<&str>, to: Option<&str>) -> AppResult<Self> {
        let from = non_empty(from).map(parse_timestamp).transpose()?;
        let to = match non_empty(to) {
            Some(t) => Some(match parse_date(t) {
                Ok(d) => date_end(d),
                Err(_) => parse_timestamp(t)?,
            }),
            None => None,
        };
        Ok(Self { from, to })
    }
}

/// A student's history, newest first. Equal timestamps list the later insert first.
pub fn list_for_student(
    conn: &Connection,
    student_id: i64,
    range: &HistoryRange,
) -> AppResult<Vec<AttendanceRecord>> {
    students::require_student(conn, student_id)?;

    let mut sql = String::from(
        "SELECT id, student_id, class_id, status, timestamp
         FROM attendance
         WHERE student_id = ?",
    );
    let mut bind: Vec<Value> = vec![Value::Integer(student_id)];
    if let Some(from) = &range.from {
        sql.push_str(" AND timestamp >= ?");
        bind.push(Value::Text(format_timestamp(from)));
    }
    if let Some(to) = &range.to {
        sql.push_str(" AND timestamp <= ?");
        bind.push(Value::Text(format_timestamp(to)));
    }
    sql.push_str(" ORDER BY timestamp DESC, id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map(params_from_iter(bind.iter()), |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, student_id, class_id, status, ts)| {
            Ok(AttendanceRecord {
                id,
                student_id,
                class_id,
                status: status.parse().map_err(|_| {
                    tracing::error!(record_id = id, status = %status, "corrupt stored status");
                    AppError::Internal
                })?,
                timestamp: parse_stored_timestamp(&ts)?,
            })
        })
        .collect()
}

/// One mark inside a batch; the student is referenced by id or by roll number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl BatchEntry {
    fn reference(&self) -> String {
        match (&self.student_id, &self.roll_number) {
            (Some(id), _) => id.to_string(),
            (None, Some(roll)) => roll.trim().to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchSubmission {
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub entries: Vec<BatchEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReceipt {
    pub batch_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub record_ids: Vec<i64>,
}

fn resolve_entry(conn: &Connection, entry: &BatchEntry) -> AppResult<(i64, AttendanceStatus)> {
    let status: AttendanceStatus = entry.status.parse()?;
    let student_id = match (&entry.student_id, &entry.roll_number) {
        (Some(id), _) => students::require_student(conn, *id)?.id,
        (None, Some(roll)) if !roll.trim().is_empty() => students::find_by_roll(conn, roll)?
            .map(|s| s.id)
            .ok_or_else(|| AppError::NotFound(format!("roll number {} not found", roll.trim())))?,
        _ => {
            return Err(AppError::Validation(
                "entry needs student_id or roll_number".to_string(),
            ))
        }
    };
    Ok((student_id, status))
}

/// Writes every entry of a batch in one transaction. Any rejected entry rolls the
/// whole batch back and the error lists each rejection. Repeated submissions for
/// the same (class, date) accumulate.
pub fn submit_batch(conn: &Connection, batch: &BatchSubmission) -> AppResult<BatchReceipt> {
    let class_id = required_class_id(&batch.class_id)?;
    let date = parse_date(&batch.date)?;
    if batch.entries.is_empty() {
        return Err(AppError::Validation("batch has no entries".to_string()));
    }
    let ts = date_start(date);
    let batch_id = uuid::Uuid::new_v4().to_string();

    let tx = conn.unchecked_transaction()?;
    let mut record_ids = Vec::with_capacity(batch.entries.len());
    let mut failures = Vec::new();
    for (index, entry) in batch.entries.iter().enumerate() {
        match resolve_entry(&tx, entry) {
            Ok((student_id, status)) => {
                let id = insert_record(&tx, student_id, &class_id, status, &ts, Some(&batch_id))?;
                record_ids.push(id);
            }
            Err(e @ (AppError::Validation(_) | AppError::NotFound(_))) => {
                failures.push(EntryFailure {
                    index,
                    reference: entry.reference(),
                    code: e.code(),
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    if !failures.is_empty() {
        warn!(
            class_id = %class_id,
            %date,
            failed = failures.len(),
            total = batch.entries.len(),
            "batch rejected, rolling back"
        );
        // Dropping the transaction rolls back the inserts made so far.
        return Err(AppError::PartialWrite {
            total: batch.entries.len(),
            failures,
        });
    }
    tx.commit()?;

    info!(
        batch_id = %batch_id,
        class_id = %class_id,
        %date,
        records = record_ids.len(),
        "batch committed"
    );
    Ok(BatchReceipt {
        batch_id,
        class_id,
        date,
        record_ids,
    })
}

pub fn count_records(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))?)
}
