use std::fmt;

use crate::models::{
    ArticleRequest, CommentRequest, LoginRequest, RegisterRequest, UpdateUserRequest,
};

const USERNAME_MAX: usize = 50;
const EMAIL_MAX: usize = 255;
const TITLE_MAX: usize = 255;
const PASSWORD_MIN: usize = 8;

/// FieldError
///
/// A single rejected field. Rendered as `"<field>: <message>"` in error details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate
///
/// Explicit payload validation: either `Ok(())` or every field error found.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

fn finish(errors: Vec<FieldError>) -> Result<(), Vec<FieldError>> {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_required(errors: &mut Vec<FieldError>, field: &'static str, value: &str) -> bool {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "must not be blank"));
        return false;
    }
    true
}

fn check_max(errors: &mut Vec<FieldError>, field: &'static str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.push(FieldError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
}

fn check_username(errors: &mut Vec<FieldError>, username: &str) {
    if check_required(errors, "username", username) {
        check_max(errors, "username", username, USERNAME_MAX);
    }
}

fn check_email(errors: &mut Vec<FieldError>, email: &str) {
    if !check_required(errors, "email", email) {
        return;
    }
    check_max(errors, "email", email, EMAIL_MAX);
    if !is_email_shaped(email) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }
}

fn check_password(errors: &mut Vec<FieldError>, password: &str) {
    if password.chars().count() < PASSWORD_MIN {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {PASSWORD_MIN} characters"),
        ));
    }
}

/// One `@`, a non-empty local part, and a domain with an inner dot.
fn is_email_shaped(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.split_once('.') {
        Some((host, rest)) => !host.is_empty() && !rest.is_empty() && !domain.ends_with('.'),
        None => false,
    }
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_username(&mut errors, &self.username);
        check_email(&mut errors, &self.email);
        check_password(&mut errors, &self.password);
        finish(errors)
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_required(&mut errors, "identifier", &self.identifier);
        check_required(&mut errors, "password", &self.password);
        finish(errors)
    }
}

impl Validate for UpdateUserRequest {
    /// Absent or empty fields are left untouched, so only provided values are checked.
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if let Some(username) = self.username.as_deref().filter(|s| !s.is_empty()) {
            check_username(&mut errors, username);
        }
        if let Some(email) = self.email.as_deref().filter(|s| !s.is_empty()) {
            check_email(&mut errors, email);
        }
        if let Some(password) = self.password.as_deref().filter(|s| !s.is_empty()) {
            check_password(&mut errors, password);
        }
        finish(errors)
    }
}

impl Validate for ArticleRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if check_required(&mut errors, "title", &self.title) {
            check_max(&mut errors, "title", &self.title, TITLE_MAX);
        }
        check_required(&mut errors, "description", &self.description);
        finish(errors)
    }
}

impl Validate for CommentRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_required(&mut errors, "comment", &self.comment);
        finish(errors)
    }
}
