use serde_json::{json, Value};

use crate::calc::{class_rank, fee_totals, student_test_summary, students_in_class};
use crate::domain::{CreateStudent, UpdateStudent};
use crate::filter::{student_filter, ViewFilters};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{list_query, required, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};

fn students_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    to_json(&state.block_on(state.queries.students(list_query(params)))?)
}

fn students_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    to_json(&state.block_on(state.queries.student(&id))?)
}

fn students_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let payload: CreateStudent = required(params, "student")?;
    if payload.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("student.name must not be empty"));
    }
    if matches!(payload.total_points, Some(p) if p < 0.0) {
        return Err(HandlerErr::bad_params("student.totalpoints must be >= 0"));
    }
    to_json(&state.block_on(state.queries.create_student(&payload))?)
}

fn students_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let patch: UpdateStudent = required(params, "patch")?;
    to_json(&state.block_on(state.queries.update_student(&id, &patch))?)
}

fn students_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    state.block_on(state.queries.delete_student(&id))?;
    Ok(json!({ "ok": true, "id": id }))
}

fn students_view(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let filters = ViewFilters::parse(params.get("filters"))
        .map_err(|e| HandlerErr::bad_params(format!("invalid filters: {}", e)))?;
    let list = state.block_on(state.queries.students(list_query(params)))?;
    let items = student_filter(&filters).apply(&list.items);
    Ok(json!({
        "items": to_json(&items)?,
        "count": items.len(),
        "total": list.total,
    }))
}

/// Student profile: test history summary, rank among classmates and fee
/// position.
fn students_overview(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let (student, scores, students, fees) = state.block_on(async {
        futures::try_join!(
            state.queries.student(&student_id),
            state.queries.student_test_scores(&student_id),
            state.queries.students(None),
            state.queries.fees(Some(json!({ "studentId": student_id }))),
        )
    })?;

    let summary = student_test_summary(&scores)?;
    let rank = student
        .class_id()
        .map(|class_id| students_in_class(&students.items, class_id))
        .and_then(|classmates| class_rank(&classmates, &student_id));
    let own_fees: Vec<_> = fees
        .items
        .into_iter()
        .filter(|f| f.student.id() == student_id)
        .collect();

    Ok(json!({
        "student": to_json(&student)?,
        "tests": to_json(&scores)?,
        "testSummary": to_json(&summary)?,
        "classRank": rank,
        "fees": to_json(&own_fees)?,
        "feeTotals": to_json(&fee_totals(&own_fees))?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, &req.params),
        "students.get" => students_get(state, &req.params),
        "students.create" => students_create(state, &req.params),
        "students.update" => students_update(state, &req.params),
        "students.delete" => students_delete(state, &req.params),
        "students.view" => students_view(state, &req.params),
        "students.overview" => students_overview(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
