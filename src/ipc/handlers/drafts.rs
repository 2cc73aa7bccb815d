use serde_json::json;

use crate::drafts::{DraftInput, DraftScope};
use crate::ipc::error::{no_workspace, reply};
use crate::ipc::helpers::params;
use crate::ipc::types::{AppState, Request};

/// The sidecar serves a single local user.
const OWNER: &str = "local";

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = params::<DraftScope>(req)
        .and_then(|scope| state.drafts.get(OWNER, &scope))
        .map(|draft| json!({ "draft": draft }));
    reply(&req.id, result)
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = params::<DraftInput>(req).and_then(|input| state.drafts.save(OWNER, &input));
    reply(&req.id, result)
}

fn handle_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = params::<DraftScope>(req)
        .and_then(|scope| state.drafts.discard(OWNER, &scope))
        .map(|discarded| json!({ "discarded": discarded }));
    reply(&req.id, result)
}

fn handle_commit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result =
        params::<DraftScope>(req).and_then(|scope| state.drafts.commit(conn, OWNER, &scope));
    reply(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "drafts.get" => Some(handle_get(state, req)),
        "drafts.save" => Some(handle_save(state, req)),
        "drafts.discard" => Some(handle_discard(state, req)),
        "drafts.commit" => Some(handle_commit(state, req)),
        _ => None,
    }
}
