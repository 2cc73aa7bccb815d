use serde::Serialize;
use serde_json::json;

use crate::error::{AppError, AppResult};

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn no_workspace(id: &str) -> serde_json::Value {
    err(id, "no_workspace", "select a workspace first", None)
}

/// Maps a core result onto the response envelope.
pub fn reply<T: Serialize>(id: &str, result: AppResult<T>) -> serde_json::Value {
    let value = result.and_then(|v| {
        serde_json::to_value(v).map_err(|e| {
            tracing::error!(error = %e, "failed to encode result");
            AppError::Internal
        })
    });
    match value {
        Ok(v) => ok(id, v),
        Err(e) => err(id, e.code(), e.to_string(), e.details()),
    }
}
