use serde::Deserialize;
use serde_json::json;

use crate::calc;
use crate::ipc::error::{no_workspace, reply};
use crate::ipc::helpers::params;
use crate::ipc::types::{AppState, Request};

#[derive(Deserialize)]
struct SummaryParams {
    #[serde(default)]
    critical_only: bool,
}

fn handle_attendance_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let opts = state.summary;
    let result = params::<SummaryParams>(req).and_then(|p| {
        let mut rows = calc::summarize(conn, &opts)?;
        if p.critical_only {
            rows.retain(|r| r.critical);
        }
        Ok(json!({ "rows": rows }))
    });
    reply(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.attendanceSummary" => Some(handle_attendance_summary(state, req)),
        _ => None,
    }
}
