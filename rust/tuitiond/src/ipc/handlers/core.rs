use serde_json::{json, Value};
use tracing::info;

use crate::domain::{LoginPayload, SignupPayload};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{optional, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};

fn handle_health(state: &mut AppState, req: &Request) -> Value {
    respond(
        req,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "apiUrl": state.config.api_url,
            "authenticated": state.queries.api().tokens().is_set(),
        })),
    )
}

fn session_login(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let payload = LoginPayload {
        email: required_str(params, "email")?,
        password: required_str(params, "password")?,
    };
    let res = state.block_on(state.queries.login(&payload))?;
    info!("session.login ok for {}", res.user.email);
    to_json(&res)
}

fn session_signup(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let payload = SignupPayload {
        name: required_str(params, "name")?,
        email: required_str(params, "email")?,
        password: required_str(params, "password")?,
        center_name: optional(params, "centerName")?,
    };
    let res = state.block_on(state.queries.signup(&payload))?;
    to_json(&res)
}

fn session_me(state: &AppState) -> Result<Value, HandlerErr> {
    let user = state.block_on(state.queries.me())?;
    to_json(&user)
}

fn session_logout(state: &AppState) -> Result<Value, HandlerErr> {
    state.block_on(state.queries.logout());
    Ok(json!({ "ok": true }))
}

fn session_set_token(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let token: Option<String> = optional(params, "token")?;
    state.block_on(state.queries.set_token(token));
    Ok(json!({ "authenticated": state.queries.api().tokens().is_set() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "health" => return Some(handle_health(state, req)),
        "session.login" => session_login(state, &req.params),
        "session.signup" => session_signup(state, &req.params),
        "session.me" => session_me(state),
        "session.logout" => session_logout(state),
        "session.setToken" => session_set_token(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
