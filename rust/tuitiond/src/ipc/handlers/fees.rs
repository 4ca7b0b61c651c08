use serde_json::{json, Value};

use crate::calc::{derive_fee_status, fee_balance, fee_totals};
use crate::domain::{current_month, is_valid_month, BulkGenerateFees, GenerateFee, UpdateFee};
use crate::filter::{fee_filter, ViewFilters};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{list_query, optional, required, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};

fn month_param(params: &Value) -> Result<String, HandlerErr> {
    let month: Option<String> = optional(params, "month")?;
    let month = month.unwrap_or_else(current_month);
    if !is_valid_month(&month) {
        return Err(HandlerErr::bad_params(format!("month must be YYYY-MM (got {})", month)));
    }
    Ok(month)
}

fn non_negative(label: &str, v: Option<f64>) -> Result<(), HandlerErr> {
    match v {
        Some(x) if x < 0.0 || !x.is_finite() => Err(HandlerErr::bad_params(format!("{} must be >= 0", label))),
        _ => Ok(()),
    }
}

fn fees_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    to_json(&state.block_on(state.queries.fees(list_query(params)))?)
}

fn fees_generate(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let payload = GenerateFee {
        student: required_str(params, "student")?,
        class: required_str(params, "class")?,
        month: month_param(params)?,
        base_amount_inr: optional(params, "baseAmountINR")?,
        discount_inr: optional(params, "discountINR")?,
    };
    non_negative("baseAmountINR", payload.base_amount_inr)?;
    non_negative("discountINR", payload.discount_inr)?;
    to_json(&state.block_on(state.queries.generate_fee(&payload))?)
}

fn fees_bulk_generate(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let payload = BulkGenerateFees {
        class_id: required_str(params, "classId")?,
        month: month_param(params)?,
    };
    state.block_on(state.queries.bulk_generate_fees(&payload)).map_err(Into::into)
}

fn fees_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let patch: UpdateFee = required(params, "patch")?;
    non_negative("paidINR", patch.paid_inr)?;
    to_json(&state.block_on(state.queries.update_fee(&id, &patch))?)
}

fn fees_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    state.block_on(state.queries.delete_fee(&id))?;
    Ok(json!({ "ok": true, "id": id }))
}

/// Fees screen: filtered rows with balance and derived status, plus
/// collected/pending totals over the visible rows.
fn fees_view(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let filters = ViewFilters::parse(params.get("filters"))
        .map_err(|e| HandlerErr::bad_params(format!("invalid filters: {}", e)))?;
    let list = state.block_on(state.queries.fees(list_query(params)))?;

    let visible: Vec<_> = fee_filter(&filters)
        .apply(&list.items)
        .into_iter()
        .cloned()
        .collect();
    let totals = fee_totals(&visible);
    let mut rows = Vec::with_capacity(visible.len());
    for fee in &visible {
        let mut row = to_json(fee)?;
        row["balance"] = json!(fee_balance(fee));
        row["derivedStatus"] = json!(derive_fee_status(fee));
        rows.push(row);
    }

    Ok(json!({
        "items": rows,
        "count": visible.len(),
        "total": list.total,
        "totals": to_json(&totals)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "fees.list" => fees_list(state, &req.params),
        "fees.generate" => fees_generate(state, &req.params),
        "fees.bulkGenerate" => fees_bulk_generate(state, &req.params),
        "fees.update" => fees_update(state, &req.params),
        "fees.delete" => fees_delete(state, &req.params),
        "fees.view" => fees_view(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
