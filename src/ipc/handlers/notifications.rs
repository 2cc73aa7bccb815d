use serde::Deserialize;
use serde_json::json;

use crate::ipc::error::{no_workspace, reply};
use crate::ipc::helpers::params;
use crate::ipc::types::{AppState, Request};
use crate::notifications::{self, NewNotification};

#[derive(Deserialize)]
struct InboxParams {
    user_id: i64,
}

fn handle_send(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = params::<NewNotification>(req)
        .and_then(|input| notifications::send_notification(conn, &input))
        .map(|id| json!({ "id": id }));
    reply(&req.id, result)
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = params::<InboxParams>(req).and_then(|p| {
        notifications::list_for_user(conn, p.user_id).map(|rows| json!({ "notifications": rows }))
    });
    reply(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notifications.send" => Some(handle_send(state, req)),
        "notifications.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
