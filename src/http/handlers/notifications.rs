use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::http::extract::{ApiJson, ApiPath};
use crate::http::{AppState, Caller};
use crate::notifications::{self, NewNotification, Notification};

/// The caller's own inbox.
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<Json<Vec<Notification>>> {
    let user_id = caller.require_session()?.0.user_id;
    let rows = state
        .db
        .call(move |conn| notifications::list_for_user(conn, user_id))
        .await?;
    Ok(Json(rows))
}

pub async fn send(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(input): ApiJson<NewNotification>,
) -> AppResult<(StatusCode, Json<Value>)> {
    caller.require_teacher()?;
    let id = state
        .db
        .call(move |conn| notifications::send_notification(conn, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Value>> {
    let user_id = caller.require_session()?.0.user_id;
    state
        .db
        .call(move |conn| notifications::mark_read(conn, user_id, id))
        .await?;
    Ok(Json(json!({ "id": id, "is_read": true })))
}
