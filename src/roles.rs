use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
        }
    }

    /// Reads a stored role column. Older rows may carry "lecturer".
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Role::Student),
            "instructor" | "lecturer" => Some(Role::Instructor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("email must use an approved institutional domain (@{domain} or @student.{domain})")]
pub struct DomainError {
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("password fields didn't match")]
pub struct MismatchError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("email is not a valid address")]
    MalformedEmail,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Mismatch(#[from] MismatchError),
}

impl RegistrationError {
    /// Submitted field the failure is reported against.
    pub fn field(&self) -> &'static str {
        match self {
            RegistrationError::MalformedEmail | RegistrationError::Domain(_) => "email",
            RegistrationError::Mismatch(_) => "password",
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn email_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-z0-9-]+(\.[a-z0-9-]+)+$").expect("valid email regex")
    })
}

/// Checks the local part and host shape of an already normalized email.
pub fn is_well_formed_email(email: &str) -> bool {
    email_shape().is_match(email)
}

/// Maps an email to its account role. The student subdomain is tested first
/// because the bare domain is also a suffix of every student address.
pub fn resolve_role(email: &str, institution_domain: &str) -> Result<Role, DomainError> {
    let email = normalize_email(email);
    let domain = institution_domain.trim().to_lowercase();
    if email.ends_with(&format!("@student.{domain}")) {
        Ok(Role::Student)
    } else if email.ends_with(&format!("@{domain}")) {
        Ok(Role::Instructor)
    } else {
        Err(DomainError { domain })
    }
}

pub fn validate_password_confirmation(
    password: &str,
    confirmation: &str,
) -> Result<(), MismatchError> {
    if password == confirmation {
        Ok(())
    } else {
        Err(MismatchError)
    }
}

/// Registration-time checks in the order they are reported: email shape,
/// domain, then password confirmation.
pub fn check_registration(
    email: &str,
    password: &str,
    confirmation: &str,
    institution_domain: &str,
) -> Result<Role, RegistrationError> {
    let email = normalize_email(email);
    if !is_well_formed_email(&email) {
        return Err(RegistrationError::MalformedEmail);
    }
    let role = resolve_role(&email, institution_domain)?;
    validate_password_confirmation(password, confirmation)?;
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "example.ac.id";

    #[test]
    fn student_subdomain_resolves_student() {
        for email in ["u@student.example.ac.id", "andre.w@student.example.ac.id"] {
            assert_eq!(resolve_role(email, DOMAIN), Ok(Role::Student));
        }
    }

    #[test]
    fn bare_domain_resolves_instructor() {
        assert_eq!(resolve_role("u@example.ac.id", DOMAIN), Ok(Role::Instructor));
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(
            resolve_role("  Budi@Student.Example.AC.ID \n", DOMAIN),
            Ok(Role::Student)
        );
        assert_eq!(normalize_email(" A@B.C "), "a@b.c");
    }

    #[test]
    fn foreign_domains_are_rejected() {
        for email in [
            "u@gmail.com",
            "u@notexample.ac.id",
            "u@student.example.ac.id.evil.com",
            "u@example.ac",
            "",
        ] {
            let e = resolve_role(email, DOMAIN).expect_err(email);
            assert_eq!(e.domain, DOMAIN);
            assert!(e.to_string().contains("approved institutional domain"));
        }
    }

    #[test]
    fn password_confirmation_is_exact() {
        assert_eq!(validate_password_confirmation("abc", "abc"), Ok(()));
        assert_eq!(
            validate_password_confirmation("abc", "ABC"),
            Err(MismatchError)
        );
        assert_eq!(
            validate_password_confirmation("abc", "abc "),
            Err(MismatchError)
        );
    }

    #[test]
    fn registration_checks_report_fields() {
        assert_eq!(
            check_registration("u@student.example.ac.id", "pw", "pw", DOMAIN),
            Ok(Role::Student)
        );

        let e = check_registration("not an email", "pw", "pw", DOMAIN).unwrap_err();
        assert_eq!(e, RegistrationError::MalformedEmail);
        assert_eq!(e.field(), "email");

        let e = check_registration("u@gmail.com", "pw", "pw", DOMAIN).unwrap_err();
        assert!(matches!(e, RegistrationError::Domain(_)));
        assert_eq!(e.field(), "email");

        let e = check_registration("u@example.ac.id", "pw", "PW", DOMAIN).unwrap_err();
        assert_eq!(e, RegistrationError::Mismatch(MismatchError));
        assert_eq!(e.field(), "password");
    }

    #[test]
    fn role_column_round_trip_accepts_legacy_lecturer() {
        assert_eq!(Role::parse("lecturer"), Some(Role::Instructor));
        assert_eq!(Role::parse(Role::Student.as_str()), Some(Role::Student));
        assert_eq!(Role::parse("admin"), None);
    }
}
