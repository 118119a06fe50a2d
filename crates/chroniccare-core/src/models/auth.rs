use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::User;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Body of a successful `auth/login/`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

/// Body of `auth/register/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub password2: String,
    pub date_of_birth: NaiveDate,
    pub profile: RegisterProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterProfile {
    pub phone_number: String,
}

/// Body of a successful `auth/register/`. Tokens are optional: without them
/// the account exists but the user still has to log in.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub user: User,
}

/// Body of `auth/refresh/` and `auth/logout/`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefreshResponse {
    pub access: String,
}
