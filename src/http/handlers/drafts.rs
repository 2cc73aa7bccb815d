use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::attendance::BatchReceipt;
use crate::drafts::{Draft, DraftInput, DraftScope};
use crate::error::{AppError, AppResult};
use crate::http::extract::{ApiJson, ApiQuery};
use crate::http::{AppState, Caller};

pub async fn get_one(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiQuery(scope): ApiQuery<DraftScope>,
) -> AppResult<Json<Draft>> {
    caller.require_teacher()?;
    state
        .drafts
        .get(&caller.draft_owner(), &scope)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no draft for this class and date".to_string()))
}

pub async fn save(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(input): ApiJson<DraftInput>,
) -> AppResult<Json<Draft>> {
    caller.require_teacher()?;
    let draft = state.drafts.save(&caller.draft_owner(), &input)?;
    Ok(Json(draft))
}

pub async fn discard(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiQuery(scope): ApiQuery<DraftScope>,
) -> AppResult<Json<Value>> {
    caller.require_teacher()?;
    let discarded = state.drafts.discard(&caller.draft_owner(), &scope)?;
    Ok(Json(json!({ "discarded": discarded })))
}

pub async fn commit(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(scope): ApiJson<DraftScope>,
) -> AppResult<(StatusCode, Json<BatchReceipt>)> {
    caller.require_teacher()?;
    let owner = caller.draft_owner();
    let drafts = Arc::clone(&state.drafts);
    let receipt = state
        .db
        .call(move |conn| drafts.commit(conn, &owner, &scope))
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
