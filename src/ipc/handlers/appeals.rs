use serde::Deserialize;
use serde_json::json;

use crate::appeals::{self, AppealScope, AppealStatus};
use crate::ipc::error::{no_workspace, reply};
use crate::ipc::helpers::params;
use crate::ipc::types::{AppState, Request};

#[derive(Deserialize)]
struct ById {
    id: i64,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    user_id: Option<i64>,
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = params::<ListParams>(req).and_then(|p| {
        let scope = p.user_id.map_or(AppealScope::All, AppealScope::FiledBy);
        appeals::list_appeals(conn, scope).map(|rows| json!({ "appeals": rows }))
    });
    reply(&req.id, result)
}

fn handle_decide(state: &mut AppState, req: &Request, decision: AppealStatus) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result =
        params::<ById>(req).and_then(|p| appeals::decide_appeal(conn, p.id, decision, None));
    reply(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "appeals.list" => Some(handle_list(state, req)),
        "appeals.approve" => Some(handle_decide(state, req, AppealStatus::Approved)),
        "appeals.reject" => Some(handle_decide(state, req, AppealStatus::Rejected)),
        _ => None,
    }
}
