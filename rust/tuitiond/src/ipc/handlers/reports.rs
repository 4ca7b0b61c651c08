use serde_json::{json, Value};

use crate::calc::financial_summary;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{respond, to_json};
use crate::ipc::types::{AppState, Request};

/// Backend dashboard report. With `includeLocal`, `local` holds the same
/// figures recomputed from the fee and expense lists.
fn reports_dashboard(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let with_local = params
        .get("includeLocal")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let report = state.block_on(state.queries.dashboard_report())?;
    let mut out = json!({ "report": to_json(&report)? });
    if with_local {
        let (fees, expenses) = state.block_on(async {
            futures::try_join!(state.queries.fees(None), state.queries.expenses(None))
        })?;
        out["local"] = to_json(&financial_summary(&fees.items, &expenses.items))?;
    }
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.dashboard" => reports_dashboard(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
