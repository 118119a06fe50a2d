//! REST API client module for the ChronicCare backend.
//!
//! This module provides the `ApiClient` for the account endpoints
//! (`auth/login/`, `auth/register/`, `auth/logout/`) and for any other
//! authenticated call.
//!
//! The API uses JWT bearer tokens. Access tokens are short-lived and are
//! renewed through `auth/refresh/` when the backend rejects them.

pub mod client;
pub mod error;

pub use client::{ApiClient, LOGIN_FAILED_MESSAGE, REGISTRATION_FAILED_MESSAGE};
pub use error::ApiError;
