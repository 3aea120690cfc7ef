use crate::config::{normalize_domain, normalize_semester, Config};
use crate::db;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Accounts,
    Term,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::Accounts, SetupSection::Term];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "accounts" => Some(Self::Accounts),
            "term" => Some(Self::Term),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Term => "term",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Accounts => "setup.accounts",
            Self::Term => "setup.term",
        }
    }
}

fn default_section(section: SetupSection, base: &Config) -> Value {
    match section {
        SetupSection::Accounts => json!({ "institutionDomain": base.institution_domain }),
        SetupSection::Term => json!({ "currentSemester": base.current_semester }),
    }
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        let s = v.as_str().ok_or_else(|| format!("{} must be string", k));
        match section {
            SetupSection::Accounts => match k.as_str() {
                "institutionDomain" => {
                    obj.insert(k.clone(), Value::String(normalize_domain(s?)?));
                }
                _ => return Err(format!("unknown accounts field: {}", k)),
            },
            SetupSection::Term => match k.as_str() {
                "currentSemester" => {
                    obj.insert(k.clone(), Value::String(normalize_semester(s?)?));
                }
                _ => return Err(format!("unknown term field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(
    conn: &rusqlite::Connection,
    section: SetupSection,
    base: &Config,
) -> anyhow::Result<Value> {
    let mut current = default_section(section, base);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // A malformed stored value must not lock the workspace out of setup.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), "ignoring stored setup: {msg}");
            }
        }
    }
    Ok(current)
}

/// Process config with the selected workspace's setup applied on top.
pub fn effective_config(state: &AppState) -> Result<Config, HandlerErr> {
    let mut cfg = state.config.clone();
    let Some(conn) = state.db.as_ref() else {
        return Ok(cfg);
    };
    let accounts = load_section(conn, SetupSection::Accounts, &state.config)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let term = load_section(conn, SetupSection::Term, &state.config)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if let Some(d) = accounts.get("institutionDomain").and_then(|v| v.as_str()) {
        cfg.institution_domain = d.to_string();
    }
    if let Some(s) = term.get("currentSemester").and_then(|v| v.as_str()) {
        cfg.current_semester = s.to_string();
    }
    Ok(cfg)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section, &state.config) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    if patch_obj.is_empty() {
        return err(&req.id, "bad_params", "patch must set at least one field", None);
    }

    // Only keys set through setup are stored; the rest keep following the
    // process config.
    let mut stored = match db::settings_get_json(conn, section.key()) {
        Ok(Some(v)) if v.is_object() => v,
        Ok(_) => json!({}),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut stored, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &stored) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    let current = match load_section(conn, section, &state.config) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    tracing::info!(section = section.name(), "setup updated");
    ok(
        &req.id,
        json!({ "ok": true, "section": section.name(), "values": current }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
