use serde_json::{json, Value};

use crate::filter::JsonFilter;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{optional, required, respond};
use crate::ipc::types::{AppState, Request};

/// Filters an arbitrary row list: `{ items, filter: { text, exact, datePrefix } }`.
fn filter_apply(params: &Value) -> Result<Value, HandlerErr> {
    let items: Vec<Value> = required(params, "items")?;
    let filter: JsonFilter = optional(params, "filter")?.unwrap_or_default();
    let kept: Vec<&Value> = filter.build().apply(&items);
    Ok(json!({
        "count": kept.len(),
        "items": kept,
    }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "filter.apply" => filter_apply(&req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
