use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::http::extract::{ApiJson, ApiPath};
use crate::http::{AppState, Caller};
use crate::model::{NewStudent, Student};
use crate::students;

/// Teachers see the roster; a student sees only their linked record.
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<Json<Vec<Student>>> {
    let mut rows = state.db.call(students::list_students).await?;
    rows.retain(|s| caller.require_view_of(s.id).is_ok());
    Ok(Json(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(input): ApiJson<NewStudent>,
) -> AppResult<(StatusCode, Json<Value>)> {
    caller.require_teacher()?;
    let id = state
        .db
        .call(move |conn| students::create_student(conn, &input))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "Student added successfully" })),
    ))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Student>> {
    caller.require_view_of(id)?;
    let student = state
        .db
        .call(move |conn| students::require_student(conn, id))
        .await?;
    Ok(Json(student))
}
