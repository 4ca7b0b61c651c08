use serde_json::{json, Value};

use crate::calc::{score_warnings, test_average_percentage};
use crate::domain::{CreateTest, UpdateTest};
use crate::filter::{test_filter, ViewFilters};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{list_query, required, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};

fn check_total_marks(total: f64) -> Result<(), HandlerErr> {
    if !total.is_finite() || total <= 0.0 {
        return Err(HandlerErr::bad_params("totalMarks must be greater than zero"));
    }
    Ok(())
}

fn tests_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    to_json(&state.block_on(state.queries.tests(list_query(params)))?)
}

fn tests_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let test = state.block_on(state.queries.test(&id))?;
    Ok(json!({
        "test": to_json(&test)?,
        "averagePercentage": test_average_percentage(&test)?,
        "warnings": to_json(&score_warnings(&test))?,
    }))
}

fn tests_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let payload: CreateTest = required(params, "test")?;
    check_total_marks(payload.total_marks)?;
    to_json(&state.block_on(state.queries.create_test(&payload))?)
}

fn tests_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let patch: UpdateTest = required(params, "patch")?;
    if let Some(total) = patch.total_marks {
        check_total_marks(total)?;
    }
    to_json(&state.block_on(state.queries.update_test(&id, &patch))?)
}

fn tests_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    state.block_on(state.queries.delete_test(&id))?;
    Ok(json!({ "ok": true, "id": id }))
}

fn tests_student_scores(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    to_json(&state.block_on(state.queries.student_test_scores(&student_id))?)
}

/// Tests screen: filtered tests, each with its class average.
fn tests_view(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let filters = ViewFilters::parse(params.get("filters"))
        .map_err(|e| HandlerErr::bad_params(format!("invalid filters: {}", e)))?;
    let list = state.block_on(state.queries.tests(list_query(params)))?;

    let mut rows = Vec::new();
    for test in test_filter(&filters).apply(&list.items) {
        let mut row = to_json(test)?;
        row["averagePercentage"] = json!(test_average_percentage(test)?);
        row["warningCount"] = json!(score_warnings(test).len());
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
        "tests.list" => tests_list(state, &req.params),
        "tests.get" => tests_get(state, &req.params),
        "tests.create" => tests_create(state, &req.params),
        "tests.update" => tests_update(state, &req.params),
        "tests.delete" => tests_delete(state, &req.params),
        "tests.studentScores" => tests_student_scores(state, &req.params),
        "tests.view" => tests_view(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
