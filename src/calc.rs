use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::{AppError, AppResult};

pub const DEFAULT_CRITICAL_THRESHOLD: f64 = 75.0;

/// Half-away-from-zero rounding to 2 decimals, matching SQL `ROUND(x, 2)`.
pub fn round_off_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `present / total * 100` rounded to 2 decimals; `None` when nothing was recorded.
pub fn attendance_percentage(present_count: i64, total_classes: i64) -> Option<f64> {
    if total_classes <= 0 {
        return None;
    }
    Some(round_off_2_decimals(
        100.0 * (present_count as f64) / (total_classes as f64),
    ))
}

#[derive(Debug, Clone, Copy)]
pub struct SummaryOptions {
    pub critical_threshold: f64,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub student_id: i64,
    pub student_name: String,
    pub roll_number: String,
    pub total_classes: i64,
    pub present_count: i64,
    pub attendance_percentage: Option<f64>,
    /// Below the critical threshold. A student with no records is not flagged.
    pub critical: bool,
}

impl SummaryRow {
    fn new(
        student_id: i64,
        student_name: String,
        roll_number: String,
        total_classes: i64,
        present_count: i64,
        opts: &SummaryOptions,
    ) -> Self {
        let attendance_percentage = attendance_percentage(present_count, total_classes);
        Self {
            student_id,
            student_name,
            roll_number,
            total_classes,
            present_count,
            attendance_percentage,
            critical: attendance_percentage
                .map(|p| p < opts.critical_threshold)
                .unwrap_or(false),
        }
    }
}

/// Worst attendance first. No percentage ranks below every number; ties by student id.
pub fn compare_rows(a: &SummaryRow, b: &SummaryRow) -> Ordering {
    let by_pct = match (a.attendance_percentage, b.attendance_percentage) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.total_cmp(&y),
    };
    by_pct.then(a.student_id.cmp(&b.student_id))
}

const SUMMARY_SQL: &str = "SELECT s.id, s.name, s.roll_number,
        COUNT(a.id) AS total_classes,
        COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0) AS present_count
     FROM students s
     LEFT JOIN attendance a ON a.student_id = s.id";

fn counts_from_row(r: &Row<'_>) -> rusqlite::Result<(i64, String, String, i64, i64)> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
}

/// One row per student, every recorded row counted (duplicates included).
pub fn summarize(conn: &Connection, opts: &SummaryOptions) -> AppResult<Vec<SummaryRow>> {
    let mut stmt = conn.prepare(&format!("{} GROUP BY s.id", SUMMARY_SQL))?;
    let counts = stmt
        .query_map([], counts_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows: Vec<SummaryRow> = counts
        .into_iter()
        .map(|(id, name, roll, total, present)| SummaryRow::new(id, name, roll, total, present, opts))
        .collect();
    rows.sort_by(compare_rows);
    Ok(rows)
}

pub fn student_summary(
    conn: &Connection,
    student_id: i64,
    opts: &SummaryOptions,
) -> AppResult<SummaryRow> {
    let counts = conn
        .query_row(
            &format!("{} WHERE s.id = ? GROUP BY s.id", SUMMARY_SQL),
            [student_id],
            counts_from_row,
        )
        .optional()?;
    let Some((id, name, roll, total, present)) = counts else {
        return Err(AppError::NotFound(format!("student {} not found", student_id)));
    };
    Ok(SummaryRow::new(id, name, roll, total, present, opts))
}
