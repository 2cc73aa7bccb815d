use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::appeals::{self, Appeal, AppealScope, AppealStatus, NewAppeal};
use crate::error::AppResult;
use crate::http::extract::{ApiJson, ApiPath};
use crate::http::{AppState, Caller};
use crate::model::Role;

/// Teachers see every appeal; a student sees the ones they filed.
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<Json<Vec<Appeal>>> {
    let scope = match &caller {
        Caller::Authenticated { session, .. } if session.role == Role::Student => {
            AppealScope::FiledBy(session.user_id)
        }
        _ => AppealScope::All,
    };
    let rows = state
        .db
        .call(move |conn| appeals::list_appeals(conn, scope))
        .await?;
    Ok(Json(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(input): ApiJson<NewAppeal>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let (session, _) = caller.require_session()?;
    let filer = session.clone();
    let id = state
        .db
        .call(move |conn| appeals::file_appeal(conn, &filer, &input))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "Appeal submitted" })),
    ))
}

async fn decide(
    state: AppState,
    caller: Caller,
    id: i64,
    decision: AppealStatus,
) -> AppResult<Json<Appeal>> {
    caller.require_teacher()?;
    let decided_by = caller.require_session().ok().map(|(s, _)| s.user_id);
    let appeal = state
        .db
        .call(move |conn| appeals::decide_appeal(conn, id, decision, decided_by))
        .await?;
    Ok(Json(appeal))
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Appeal>> {
    decide(state, caller, id, AppealStatus::Approved).await
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Appeal>> {
    decide(state, caller, id, AppealStatus::Rejected).await
}
