use crate::auth;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::effective_config;
use crate::ipc::helpers::{raw_str_param, require_conn, require_session, str_param, string_max};
use crate::ipc::types::{AppState, Request};
use crate::roles::{check_registration, normalize_email};
use crate::store::{self, NewUser, UserRow};
use serde_json::json;

/// Programme codes accepted for `major`, with their short labels.
pub const MAJORS: [(&str, &str); 6] = [
    ("artificial_intelligence_and_robotics", "AIR"),
    ("business_mathematics", "BM"),
    ("digital_business_technology", "DBT"),
    ("product_design_innovation", "PDI"),
    ("energy_business_technology", "EBT"),
    ("food_business_technology", "FBT"),
];

const NAME_MAX: usize = 150;

fn user_json(user: &UserRow) -> serde_json::Value {
    json!({
        "id": user.id,
        "firstName": user.first_name,
        "lastName": user.last_name,
        "fullName": user.full_name,
        "email": user.email,
        "username": user.username,
        "major": user.major,
        "role": user.role,
    })
}

fn register(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let cfg = effective_config(state)?;

    let first_name = str_param(req, "firstName");
    let last_name = str_param(req, "lastName");
    let email = str_param(req, "email");
    let username = str_param(req, "username");
    let password = raw_str_param(req, "password");
    let confirmation = raw_str_param(req, "passwordConfirmation");

    let missing: Vec<&str> = [
        ("firstName", first_name.is_none()),
        ("lastName", last_name.is_none()),
        ("email", email.is_none()),
        ("username", username.is_none()),
        ("password", password.is_none()),
        ("passwordConfirmation", confirmation.is_none()),
    ]
    .into_iter()
    .filter_map(|(k, absent)| absent.then_some(k))
    .collect();
    let (
        Some(first_name),
        Some(last_name),
        Some(email),
        Some(username),
        Some(password),
        Some(confirmation),
    ) = (first_name, last_name, email, username, password, confirmation)
    else {
        return Err(HandlerErr::new(
            "bad_request",
            format!("Missing required fields: {}", missing.join(", ")),
        )
        .with_details(json!({ "fields": missing })));
    };

    let first_name = string_max(first_name, "firstName", NAME_MAX)?;
    let last_name = string_max(last_name, "lastName", NAME_MAX)?;
    let username = string_max(username, "username", NAME_MAX)?;

    let role = check_registration(&email, password, confirmation, &cfg.institution_domain)
        .map_err(|e| {
            tracing::info!(username = %username, field = e.field(), "registration rejected: {e}");
            HandlerErr::bad_request(e.to_string(), e.field())
        })?;
    let email = normalize_email(&email);

    let major = str_param(req, "major");
    if let Some(m) = major.as_deref() {
        if !MAJORS.iter().any(|(code, _)| *code == m) {
            return Err(HandlerErr::bad_request(
                format!(
                    "major must be one of: {}",
                    MAJORS.iter().map(|(c, _)| *c).collect::<Vec<_>>().join(", ")
                ),
                "major",
            ));
        }
    }

    let email_taken = store::user_by_email(conn, &email)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .is_some();
    if email_taken {
        return Err(HandlerErr::new("conflict", "Email is already in use.")
            .with_details(json!({ "field": "email" })));
    }
    let username_taken = store::user_by_username(conn, &username)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .is_some();
    if username_taken {
        return Err(HandlerErr::new("conflict", "Username is already in use.")
            .with_details(json!({ "field": "username" })));
    }

    let password_hash = auth::hash_password(password, cfg.password_rounds)
        .map_err(|e| HandlerErr::db("password_hash_failed", e))?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e.into()))?;
    let user = store::user_insert(
        &tx,
        &NewUser {
            username: &username,
            email: &email,
            first_name: &first_name,
            last_name: &last_name,
            major: major.as_deref(),
            role,
            password_hash: &password_hash,
        },
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "users" })))?;
    let token = store::token_get_or_create(&tx, &user.id)
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e.into()))?;

    tracing::info!(username = %user.username, role = role.as_str(), "account registered");
    Ok(json!({ "user": user_json(&user), "token": token }))
}

fn authenticate(
    conn: &rusqlite::Connection,
    identifier: &str,
    password: &str,
) -> Result<Option<UserRow>, HandlerErr> {
    let by_username = store::user_by_username(conn, identifier)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if let Some(user) = by_username {
        if auth::verify_password(password, &user.password_hash) {
            return Ok(Some(user));
        }
    }
    if !identifier.contains('@') {
        return Ok(None);
    }
    let by_email = store::user_by_email(conn, &normalize_email(identifier))
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(by_email.filter(|u| auth::verify_password(password, &u.password_hash)))
}

fn login(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let identifier = str_param(req, "username").or_else(|| str_param(req, "usernameOrEmail"));
    let password = raw_str_param(req, "password");
    let (Some(identifier), Some(password)) = (identifier, password) else {
        return Err(HandlerErr::new(
            "bad_request",
            "Username/Email and password are required.",
        ));
    };

    let Some(user) = authenticate(conn, &identifier, password)? else {
        tracing::info!(identifier = %identifier, "login failed");
        return Err(HandlerErr::new("unauthorized", "Invalid credentials."));
    };
    let token = store::token_get_or_create(conn, &user.id)
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    tracing::debug!(username = %user.username, "login ok");
    Ok(json!({
        "token": { "access": token, "refresh": token },
        "user": {
            "id": user.id,
            "email": user.email,
            "username": user.username,
            "fullName": user.full_name,
            "major": user.major,
            "role": user.role,
        }
    }))
}

fn logout(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user = require_session(conn, req)?;
    store::tokens_revoke(conn, &user.id).map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    Ok(json!({ "detail": "Successfully logged out." }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.register" => Some(respond(&req.id, register(state, req))),
        "auth.login" => Some(respond(&req.id, login(state, req))),
        "auth.logout" => Some(respond(&req.id, logout(state, req))),
        _ => None,
    }
}
