use serde_json::json;

/// HTTP-equivalent status reported alongside an error code.
pub fn status_for(code: &str) -> u16 {
    match code {
        "bad_request" | "bad_params" | "bad_json" => 400,
        "unauthorized" => 401,
        "forbidden" => 403,
        "not_found" => 404,
        "conflict" | "no_workspace" => 409,
        "not_implemented" => 501,
        _ => 500,
    }
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
        "status": status_for(code),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>, field: &str) -> Self {
        Self::new("bad_request", message).with_details(json!({ "field": field }))
    }

    pub fn db(code: &'static str, e: anyhow::Error) -> Self {
        tracing::error!(code, "storage failure: {e:#}");
        Self::new(code, e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Turns a handler outcome into the wire envelope.
pub fn respond(id: &str, outcome: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match outcome {
        Ok(result) => ok(id, result),
        Err(e) => e.response(id),
    }
}
