use serde_json::{json, Value};

use crate::calc::{expense_category_breakdown, expense_total};
use crate::domain::{CreateExpense, UpdateExpense};
use crate::filter::{expense_filter, ViewFilters};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{list_query, required, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};

fn expenses_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    to_json(&state.block_on(state.queries.expenses(list_query(params)))?)
}

fn expenses_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let payload: CreateExpense = required(params, "expense")?;
    if payload.amount < 0.0 {
        return Err(HandlerErr::bad_params("expense.amount must be >= 0"));
    }
    to_json(&state.block_on(state.queries.create_expense(&payload))?)
}

fn expenses_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let patch: UpdateExpense = required(params, "patch")?;
    if matches!(patch.amount, Some(a) if a < 0.0) {
        return Err(HandlerErr::bad_params("patch.amount must be >= 0"));
    }
    to_json(&state.block_on(state.queries.update_expense(&id, &patch))?)
}

fn expenses_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    state.block_on(state.queries.delete_expense(&id))?;
    Ok(json!({ "ok": true, "id": id }))
}

fn expenses_view(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let filters = ViewFilters::parse(params.get("filters"))
        .map_err(|e| HandlerErr::bad_params(format!("invalid filters: {}", e)))?;
    let list = state.block_on(state.queries.expenses(list_query(params)))?;

    let visible: Vec<_> = expense_filter(&filters)
        .apply(&list.items)
        .into_iter()
        .cloned()
        .collect();
    Ok(json!({
        "items": to_json(&visible)?,
        "count": visible.len(),
        "total": list.total,
        "amountTotal": expense_total(&visible),
        "categories": to_json(&expense_category_breakdown(&visible))?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "expenses.list" => expenses_list(state, &req.params),
        "expenses.create" => expenses_create(state, &req.params),
        "expenses.update" => expenses_update(state, &req.params),
        "expenses.delete" => expenses_delete(state, &req.params),
        "expenses.view" => expenses_view(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
