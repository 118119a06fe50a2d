//! Core library for the ChronicCare symptom tracker client.
//!
//! - `api`: Session client for the REST backend, with token refresh
//! - `auth`: Token storage and the session object
//! - `config`: Client configuration
//! - `forms`: Login and sign-up form checks
//! - `models`: API data types

pub mod api;
pub mod auth;
pub mod config;
pub mod forms;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{Session, SessionState, TokenStore};
pub use config::Config;
