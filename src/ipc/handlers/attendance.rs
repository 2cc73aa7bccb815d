use serde::Deserialize;
use serde_json::json;

use crate::attendance::{self, BatchSubmission, HistoryRange};
use crate::calc;
use crate::ipc::error::{no_workspace, reply};
use crate::ipc::helpers::params;
use crate::ipc::types::{AppState, Request};
use crate::model::NewAttendance;

#[derive(Deserialize)]
struct HistoryParams {
    student_id: i64,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
}

#[derive(Deserialize)]
struct StudentParams {
    student_id: i64,
}

fn handle_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = params::<NewAttendance>(req)
        .and_then(|input| attendance::record_attendance(conn, &input))
        .map(|id| json!({ "id": id }));
    reply(&req.id, result)
}

fn handle_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = params::<HistoryParams>(req).and_then(|p| {
        let range = HistoryRange::parse(p.from.as_deref(), p.to.as_deref())?;
        let records = attendance::list_for_student(conn, p.student_id, &range)?;
        Ok(json!({ "records": records }))
    });
    reply(&req.id, result)
}

fn handle_submit_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result =
        params::<BatchSubmission>(req).and_then(|batch| attendance::submit_batch(conn, &batch));
    reply(&req.id, result)
}

fn handle_student_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let opts = state.summary;
    let result =
        params::<StudentParams>(req).and_then(|p| calc::student_summary(conn, p.student_id, &opts));
    reply(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(handle_record(state, req)),
        "attendance.history" => Some(handle_history(state, req)),
        "attendance.submitBatch" => Some(handle_submit_batch(state, req)),
        "attendance.studentSummary" => Some(handle_student_summary(state, req)),
        _ => None,
    }
}
