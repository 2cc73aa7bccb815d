use serde::Deserialize;
use serde_json::json;

use crate::ipc::error::{no_workspace, reply};
use crate::ipc::helpers::params;
use crate::ipc::types::{AppState, Request};
use crate::model::NewStudent;
use crate::students;

#[derive(Deserialize)]
struct ById {
    id: i64,
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    reply(
        &req.id,
        students::list_students(conn).map(|rows| json!({ "students": rows })),
    )
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = params::<NewStudent>(req)
        .and_then(|input| students::create_student(conn, &input))
        .map(|id| json!({ "id": id }));
    reply(&req.id, result)
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = params::<ById>(req).and_then(|p| students::require_student(conn, p.id));
    reply(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.get" => Some(handle_get(state, req)),
        _ => None,
    }
}
