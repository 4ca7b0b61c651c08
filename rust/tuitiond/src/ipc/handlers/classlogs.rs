use serde_json::{json, Value};

use crate::domain::{AttendanceStatus, ClassLog, CreateClassLog, UpdateClassLog};
use crate::filter::{class_log_filter, ViewFilters};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{list_query, required, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};

fn classlogs_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    to_json(&state.block_on(state.queries.class_logs(list_query(params)))?)
}

fn classlogs_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    to_json(&state.block_on(state.queries.class_log(&id))?)
}

fn classlogs_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let payload: CreateClassLog = required(params, "log")?;
    if payload.date.trim().is_empty() {
        return Err(HandlerErr::bad_params("log.date must not be empty"));
    }
    to_json(&state.block_on(state.queries.create_class_log(&payload))?)
}

fn classlogs_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let patch: UpdateClassLog = required(params, "patch")?;
    to_json(&state.block_on(state.queries.update_class_log(&id, &patch))?)
}

fn classlogs_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    state.block_on(state.queries.delete_class_log(&id))?;
    Ok(json!({ "ok": true, "id": id }))
}

fn present_count(log: &ClassLog) -> usize {
    log.attendance
        .iter()
        .filter(|a| matches!(a.status, AttendanceStatus::Present | AttendanceStatus::Late))
        .count()
}

fn classlogs_view(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let filters = ViewFilters::parse(params.get("filters"))
        .map_err(|e| HandlerErr::bad_params(format!("invalid filters: {}", e)))?;
    let list = state.block_on(state.queries.class_logs(list_query(params)))?;

    let mut rows = Vec::new();
    for log in class_log_filter(&filters).apply(&list.items) {
        let mut row = to_json(log)?;
        row["presentCount"] = json!(present_count(log));
        row["attendanceCount"] = json!(log.attendance.len());
        rows.push(row);
    }
    Ok(json!({
        "count": rows.len(),
        "items": rows,
        "total": list.total,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "classlogs.list" => classlogs_list(state, &req.params),
        "classlogs.get" => classlogs_get(state, &req.params),
        "classlogs.create" => classlogs_create(state, &req.params),
        "classlogs.update" => classlogs_update(state, &req.params),
        "classlogs.delete" => classlogs_delete(state, &req.params),
        "classlogs.view" => classlogs_view(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
