use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Non-2xx response. `message` comes from the body's `error` or `message`
    /// field when present.
    #[error("{message} (HTTP {status})")]
    Status {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("invalid request url: {0}")]
    Url(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(s) if (400..500).contains(&s))
    }

    /// IPC error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Status { .. } => "api_error",
            ApiError::Transport(_) => "transport_error",
            ApiError::Decode(_) | ApiError::Url(_) => "api_error",
        }
    }

    /// Normalises a failed response into `ApiError::Status`.
    pub fn from_response(status: StatusCode, text: &str) -> Self {
        let body: Option<Value> = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
        };

        let from_field = body.as_ref().and_then(|b| {
            ["error", "message"]
                .iter()
                .find_map(|k| b.get(k).and_then(|v| v.as_str()))
                .map(str::to_string)
        });
        let message = from_field
            .or_else(|| match &body {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            })
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        ApiError::Status {
            status: status.as_u16(),
            message,
            body,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(e: url::ParseError) -> Self {
        ApiError::Url(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_prefers_error_then_message_field() {
        let e = ApiError::from_response(StatusCode::BAD_REQUEST, r#"{"error":"month is required"}"#);
        assert_eq!(e.status(), Some(400));
        assert!(matches!(&e, ApiError::Status { message, .. } if message == "month is required"));

        let e = ApiError::from_response(StatusCode::NOT_FOUND, r#"{"message":"Class not found"}"#);
        assert!(matches!(&e, ApiError::Status { message, body: Some(b), .. }
            if message == "Class not found" && b == &json!({"message": "Class not found"})));
    }

    #[test]
    fn message_falls_back_to_raw_body_then_reason() {
        let e = ApiError::from_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(&e, ApiError::Status { message, .. } if message == "upstream down"));

        let e = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(matches!(&e, ApiError::Status { message, body: None, .. } if message == "Internal Server Error"));
        assert!(!e.is_client_error());
        assert_eq!(e.code(), "api_error");
    }
}
