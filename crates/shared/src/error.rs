use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rejection body returned by the survey service. Any of the fields may be
/// missing; `detail` is sometimes a structured validation list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ErrorBody {
    /// First non-empty field in `detail`, `message`, `error` order.
    pub fn first_message(&self) -> Option<String> {
        [&self.detail, &self.message, &self.error]
            .into_iter()
            .flatten()
            .find_map(render_value)
    }
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Server-supplied explanation carried by a rejected response body.
///
/// A JSON string body is used verbatim, a JSON object contributes its first
/// message field, and a body that is not JSON at all is used as plain text.
pub fn server_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(s)) => s,
        Ok(value @ Value::Object(_)) => serde_json::from_value::<ErrorBody>(value)
            .ok()
            .and_then(|body| body.first_message())
            .unwrap_or_default(),
        Ok(_) => String::new(),
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
