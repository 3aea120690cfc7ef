use crate::grades::fits_score_column;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::roles::Role;
use crate::store::{self, CourseRow, UserRow};
use rusqlite::Connection;
use serde_json::json;

pub fn require_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Trimmed string param; absent, non-string and blank all read as `None`.
pub fn str_param(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Raw string param, untouched. Passwords are compared byte for byte.
pub fn raw_str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    str_param(req, key).ok_or_else(|| HandlerErr::bad_request(format!("missing {key}"), key))
}

pub fn string_max(value: String, key: &str, max_len: usize) -> Result<String, HandlerErr> {
    if value.chars().count() > max_len {
        return Err(HandlerErr::bad_request(
            format!("{key} length must be <= {max_len}"),
            key,
        ));
    }
    Ok(value)
}

/// Score/weight values: JSON numbers or numeric strings that fit the
/// two-decimal, five-digit column.
pub fn score_value(v: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    let n = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(n) = n else {
        return Err(HandlerErr::bad_request(format!("{key} must be a number"), key));
    };
    if !fits_score_column(n) {
        return Err(HandlerErr::bad_request(
            format!("{key} must be a finite number below 1000"),
            key,
        )
        .with_details(json!({ "field": key, "value": v })));
    }
    Ok(n)
}

pub fn require_session(conn: &Connection, req: &Request) -> Result<UserRow, HandlerErr> {
    let Some(token) = str_param(req, "token") else {
        return Err(HandlerErr::new(
            "unauthorized",
            "Authentication credentials were not provided.",
        ));
    };
    match store::token_user(conn, &token) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(HandlerErr::new("unauthorized", "Invalid token.")),
        Err(e) => Err(HandlerErr::db("db_query_failed", e)),
    }
}

pub fn require_role(user: &UserRow, role: Role, method: &str) -> Result<(), HandlerErr> {
    if user.role != role {
        tracing::warn!(
            user = %user.username,
            role = user.role.as_str(),
            method,
            "forbidden: wrong role"
        );
        return Err(HandlerErr::new("forbidden", "Forbidden."));
    }
    Ok(())
}

/// Loads a course by code and checks the caller teaches it.
pub fn require_course_lecturer(
    conn: &Connection,
    user: &UserRow,
    code: &str,
) -> Result<CourseRow, HandlerErr> {
    let course = store::course_by_code(conn, code)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "Course not found.")
                .with_details(json!({ "courseCode": code }))
        })?;
    if course.lecturer_id.as_deref() != Some(user.id.as_str()) {
        tracing::warn!(user = %user.username, course = %course.code, "forbidden: not the lecturer");
        return Err(HandlerErr::new("forbidden", "Forbidden."));
    }
    Ok(course)
}

/// True when a store insert failed on a UNIQUE/PRIMARY KEY constraint.
pub fn is_unique_violation(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(f, _))
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
