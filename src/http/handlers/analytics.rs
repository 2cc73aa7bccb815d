use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::calc::{self, SummaryRow};
use crate::error::AppResult;
use crate::http::extract::ApiQuery;
use crate::http::{AppState, Caller};

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    pub critical_only: bool,
}

/// Worst attendance first; `?critical_only=true` keeps flagged rows only.
pub async fn attendance_summary(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiQuery(q): ApiQuery<SummaryQuery>,
) -> AppResult<Json<Vec<SummaryRow>>> {
    caller.require_teacher()?;
    let opts = state.config.summary_options();
    let mut rows = state.db.call(move |conn| calc::summarize(conn, &opts)).await?;
    if q.critical_only {
        rows.retain(|r| r.critical);
    }
    Ok(Json(rows))
}
