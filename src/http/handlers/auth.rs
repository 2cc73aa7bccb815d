use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::auth::{self, LoginGrant, LoginInput, RegisterInput, UserInfo};
use crate::error::AppResult;
use crate::http::extract::ApiJson;
use crate::http::{AppState, Caller};

/// Open to everyone; the caller decides what may be created. See [`auth::Registrar`].
pub async fn register(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(input): ApiJson<RegisterInput>,
) -> AppResult<(StatusCode, Json<UserInfo>)> {
    let registrar = caller.registrar(state.config.require_auth);
    let user = state
        .db
        .call(move |conn| auth::register(conn, &input, registrar))
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginInput>,
) -> AppResult<Json<LoginGrant>> {
    let ttl = state.config.session_ttl();
    let grant = state
        .db
        .call(move |conn| auth::login(conn, &input, ttl))
        .await?;
    Ok(Json(grant))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<Json<Value>> {
    let (_, token) = caller.require_session()?;
    let token = token.to_string();
    state.db.call(move |conn| auth::logout(conn, &token)).await?;
    Ok(Json(json!({ "message": "Logged out" })))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<Json<UserInfo>> {
    let (session, _) = caller.require_session()?;
    let user_id = session.user_id;
    let user = state.db.call(move |conn| auth::get_user(conn, user_id)).await?;
    Ok(Json(user))
}
