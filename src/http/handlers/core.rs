use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::http::AppState;

pub async fn banner() -> Json<Value> {
    Json(json!({
        "message": "EduTrack API is running!",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "active",
    }))
}

/// Round-trips the database so a dead store reports STORAGE_UNAVAILABLE.
pub async fn health(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state
        .db
        .call(|conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
        .await?;
    Ok(Json(json!({ "status": "healthy", "database": "connected" })))
}
