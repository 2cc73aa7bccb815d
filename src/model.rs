use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub roll_number: String,
    pub email: Option<String>,
    pub department: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStudent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roll_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(AppError::Validation(format!(
                "status must be present or absent, got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: i64,
    pub class_id: String,
    pub status: AttendanceStatus,
    pub timestamp: DateTime<Utc>,
}

/// Request shape for a single mark. `status` and `timestamp` stay raw strings so
/// bad input surfaces as a VALIDATION error rather than a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAttendance {
    pub student_id: Option<i64>,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            _ => Err(AppError::Validation(
                "role must be teacher or student".to_string(),
            )),
        }
    }
}

/// Fixed-width UTC text, so lexical order in SQL equals chronological order.
/// Stored precision is milliseconds; finer digits are truncated, and records
/// within the same millisecond order by id.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn parse_stored_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            tracing::error!(value = raw, error = %e, "corrupt stored timestamp");
            AppError::Internal
        })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let t = raw.trim();
    if let Ok(v) = DateTime::parse_from_rfc3339(t) {
        return Ok(v.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(v) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(v.and_utc());
        }
    }
    parse_date(t).map(date_start)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::Validation(format!("expected a date (YYYY-MM-DD) or timestamp, got {:?}", raw))
    })
}

pub fn date_start(d: NaiveDate) -> DateTime<Utc> {
    d.and_time(NaiveTime::MIN).and_utc()
}

/// Last stored instant of the day.
pub fn date_end(d: NaiveDate) -> DateTime<Utc> {
    date_start(d) + chrono::Duration::days(1) - chrono::Duration::milliseconds(1)
}
