use crate::auth::{DEFAULT_PASSWORD_ROUNDS, MIN_PASSWORD_ROUNDS};

pub const DEFAULT_INSTITUTION_DOMAIN: &str = "prasetiyamulya.ac.id";
pub const DEFAULT_CURRENT_SEMESTER: &str = "Fall 2023";

pub const ENV_INSTITUTION_DOMAIN: &str = "SISD_INSTITUTION_DOMAIN";
pub const ENV_CURRENT_SEMESTER: &str = "SISD_CURRENT_SEMESTER";
pub const ENV_PASSWORD_ROUNDS: &str = "SISD_PASSWORD_ROUNDS";
pub const ENV_LOG: &str = "SISD_LOG";

/// Process-level defaults. Workspace settings (`setup.update`) layer on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub institution_domain: String,
    pub current_semester: String,
    /// PBKDF2 iterations for newly stored password hashes.
    pub password_rounds: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            institution_domain: DEFAULT_INSTITUTION_DOMAIN.to_string(),
            current_semester: DEFAULT_CURRENT_SEMESTER.to_string(),
            password_rounds: DEFAULT_PASSWORD_ROUNDS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(domain) = lookup(ENV_INSTITUTION_DOMAIN) {
            match normalize_domain(&domain) {
                Ok(d) => cfg.institution_domain = d,
                Err(msg) => tracing::warn!("ignoring {}: {}", ENV_INSTITUTION_DOMAIN, msg),
            }
        }
        if let Some(semester) = lookup(ENV_CURRENT_SEMESTER) {
            match normalize_semester(&semester) {
                Ok(s) => cfg.current_semester = s,
                Err(msg) => tracing::warn!("ignoring {}: {}", ENV_CURRENT_SEMESTER, msg),
            }
        }
        if let Some(rounds) = lookup(ENV_PASSWORD_ROUNDS) {
            match parse_password_rounds(&rounds) {
                Ok(n) => cfg.password_rounds = n,
                Err(msg) => tracing::warn!("ignoring {}: {}", ENV_PASSWORD_ROUNDS, msg),
            }
        }
        cfg
    }
}

fn parse_password_rounds(raw: &str) -> Result<u32, String> {
    let n: u32 = raw
        .trim()
        .parse()
        .map_err(|_| "password rounds must be a positive integer".to_string())?;
    if n < MIN_PASSWORD_ROUNDS {
        return Err(format!("password rounds must be >= {MIN_PASSWORD_ROUNDS}"));
    }
    Ok(n)
}

pub fn normalize_domain(raw: &str) -> Result<String, String> {
    let d = raw.trim().trim_start_matches('@').to_lowercase();
    if d.is_empty() {
        return Err("institution domain must not be empty".into());
    }
    if d.contains('@') || d.contains(char::is_whitespace) {
        return Err("institution domain must be a bare host name".into());
    }
    if !d.contains('.') || d.starts_with('.') || d.ends_with('.') {
        return Err("institution domain must look like example.ac.id".into());
    }
    if d.len() > 253 {
        return Err("institution domain length must be <= 253".into());
    }
    Ok(d)
}

pub fn normalize_semester(raw: &str) -> Result<String, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("semester must not be empty".into());
    }
    if s.len() > 20 {
        return Err("semester length must be <= 20".into());
    }
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_INSTITUTION_DOMAIN, " @Example.AC.ID "),
            (ENV_CURRENT_SEMESTER, "Spring 2024"),
            (ENV_PASSWORD_ROUNDS, " 1200 "),
        ]);
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.institution_domain, "example.ac.id");
        assert_eq!(cfg.current_semester, "Spring 2024");
        assert_eq!(cfg.password_rounds, 1200);
    }

    #[test]
    fn invalid_env_values_fall_back() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_INSTITUTION_DOMAIN, "localhost"),
            (ENV_CURRENT_SEMESTER, "   "),
            (ENV_PASSWORD_ROUNDS, "10"),
        ]);
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn domain_validation() {
        assert!(normalize_domain("a@b.c").is_err());
        assert!(normalize_domain(".ac.id").is_err());
        assert_eq!(normalize_domain("Uni.Edu").as_deref(), Ok("uni.edu"));
    }
}
