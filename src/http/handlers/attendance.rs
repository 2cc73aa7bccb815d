use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::attendance::{self, BatchReceipt, BatchSubmission, HistoryRange};
use crate::calc::{self, SummaryRow};
use crate::error::AppResult;
use crate::http::extract::{ApiJson, ApiPath, ApiQuery};
use crate::http::{AppState, Caller};
use crate::model::{AttendanceRecord, NewAttendance};

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

pub async fn record(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(input): ApiJson<NewAttendance>,
) -> AppResult<(StatusCode, Json<Value>)> {
    caller.require_teacher()?;
    let id = state
        .db
        .call(move |conn| attendance::record_attendance(conn, &input))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "Attendance marked successfully" })),
    ))
}

pub async fn submit_batch(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(batch): ApiJson<BatchSubmission>,
) -> AppResult<(StatusCode, Json<BatchReceipt>)> {
    caller.require_teacher()?;
    let receipt = state
        .db
        .call(move |conn| attendance::submit_batch(conn, &batch))
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(student_id): ApiPath<i64>,
    ApiQuery(q): ApiQuery<HistoryQuery>,
) -> AppResult<Json<Vec<AttendanceRecord>>> {
    caller.require_view_of(student_id)?;
    let range = HistoryRange::parse(q.from.as_deref(), q.to.as_deref())?;
    let records = state
        .db
        .call(move |conn| attendance::list_for_student(conn, student_id, &range))
        .await?;
    Ok(Json(records))
}

pub async fn student_summary(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(student_id): ApiPath<i64>,
) -> AppResult<Json<SummaryRow>> {
    caller.require_view_of(student_id)?;
    let opts = state.config.summary_options();
    let row = state
        .db
        .call(move |conn| calc::student_summary(conn, student_id, &opts))
        .await?;
    Ok(Json(row))
}
