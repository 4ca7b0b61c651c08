use serde_json::{json, Value};

use crate::calc::{class_aggregate_counts, rank_order, students_in_class};
use crate::domain::{CreateClass, HasId, UpdateClass};
use crate::filter::{class_filter, ViewFilters};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{list_query, required, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};

fn classes_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let list = state.block_on(state.queries.classes(list_query(params)))?;
    to_json(&list)
}

fn classes_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    to_json(&state.block_on(state.queries.class(&id))?)
}

fn classes_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let payload: CreateClass = required(params, "class")?;
    if payload.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("class.name must not be empty"));
    }
    to_json(&state.block_on(state.queries.create_class(&payload))?)
}

fn classes_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let patch: UpdateClass = required(params, "patch")?;
    to_json(&state.block_on(state.queries.update_class(&id, &patch))?)
}

fn classes_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    state.block_on(state.queries.delete_class(&id))?;
    Ok(json!({ "ok": true, "id": id }))
}

fn classes_view(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let filters = ViewFilters::parse(params.get("filters"))
        .map_err(|e| HandlerErr::bad_params(format!("invalid filters: {}", e)))?;
    let list = state.block_on(state.queries.classes(list_query(params)))?;
    let items = class_filter(&filters).apply(&list.items);
    Ok(json!({
        "items": to_json(&items)?,
        "count": items.len(),
        "total": list.total,
    }))
}

/// Class detail screen: roster ranked by points plus log/test counts.
fn classes_overview(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let (class, students, logs, tests) = state.block_on(async {
        let class_id_query = Some(json!({ "classId": class_id }));
        futures::try_join!(
            state.queries.class(&class_id),
            state.queries.students(None),
            state.queries.class_logs(class_id_query.clone()),
            state.queries.tests(class_id_query.clone()),
        )
    })?;

    let roster = students_in_class(&students.items, &class_id);
    let logs: Vec<_> = logs
        .items
        .into_iter()
        .filter(|l| l.class.id() == class_id)
        .collect();
    let tests: Vec<_> = tests
        .items
        .into_iter()
        .filter(|t| t.class.id() == class_id)
        .collect();
    let counts = class_aggregate_counts(&roster, &logs, &tests);
    let ranking: Vec<Value> = rank_order(&roster)
        .iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "rank": i + 1,
                "studentId": s.id(),
                "name": s.name,
                "totalPoints": s.total_points,
            })
        })
        .collect();

    Ok(json!({
        "class": to_json(&class)?,
        "counts": to_json(&counts)?,
        "ranking": ranking,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "classes.list" => classes_list(state, &req.params),
        "classes.get" => classes_get(state, &req.params),
        "classes.create" => classes_create(state, &req.params),
        "classes.update" => classes_update(state, &req.params),
        "classes.delete" => classes_delete(state, &req.params),
        "classes.view" => classes_view(state, &req.params),
        "classes.overview" => classes_overview(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
