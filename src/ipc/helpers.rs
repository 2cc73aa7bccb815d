use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};
use crate::ipc::types::Request;

/// Decodes `params` into `T`. Absent params decode as an empty object.
pub fn params<T: DeserializeOwned>(req: &Request) -> AppResult<T> {
    let raw = if req.params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        req.params.clone()
    };
    serde_json::from_value(raw).map_err(|e| AppError::Validation(format!("bad params: {}", e)))
}
