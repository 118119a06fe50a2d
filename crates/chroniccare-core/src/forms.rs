//! Login and sign-up form handling.
//!
//! Forms only check presence and password confirmation; everything else is
//! validated by the backend. Checks run before any network call.

use chrono::NaiveDate;

use crate::api::{ApiError, LOGIN_FAILED_MESSAGE, REGISTRATION_FAILED_MESSAGE};
use crate::models::{RegisterProfile, RegisterRequest};

pub const MISSING_LOGIN_FIELDS: &str = "Please enter both username and password";
pub const MISSING_SIGNUP_FIELDS: &str = "Please fill in all fields";
pub const PASSWORD_MISMATCH: &str = "Passwords do not match";

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(MISSING_LOGIN_FIELDS);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<(), &'static str> {
        let fields = [
            &self.full_name,
            &self.email,
            &self.phone_number,
            &self.password,
            &self.confirm_password,
        ];
        if fields.iter().any(|field| field.is_empty()) {
            return Err(MISSING_SIGNUP_FIELDS);
        }
        if self.password != self.confirm_password {
            return Err(PASSWORD_MISMATCH);
        }
        Ok(())
    }

    /// Build the registration body. The username is the local part of the
    /// email, and the date of birth is not collected so it defaults to `today`.
    pub fn to_request(&self, today: NaiveDate) -> RegisterRequest {
        let (first_name, last_name) = split_full_name(&self.full_name);
        let username = self
            .email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string();

        RegisterRequest {
            username,
            email: self.email.clone(),
            first_name,
            last_name,
            password: self.password.clone(),
            password2: self.confirm_password.clone(),
            date_of_birth: today,
            profile: RegisterProfile {
                phone_number: self.phone_number.clone(),
            },
        }
    }
}

/// First word is the first name; the remaining words are the last name.
fn split_full_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.trim().split(' ');
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

/// Message shown under the login form for a failed login.
pub fn login_error_message(err: &ApiError) -> String {
    match err {
        ApiError::Auth(message) => message.clone(),
        _ => LOGIN_FAILED_MESSAGE.to_string(),
    }
}

/// Message shown under the sign-up form for a failed registration.
pub fn registration_error_message(err: &ApiError) -> String {
    match err {
        ApiError::Validation(message) => message.clone(),
        _ => REGISTRATION_FAILED_MESSAGE.to_string(),
    }
}
