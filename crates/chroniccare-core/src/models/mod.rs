//! Data models for the ChronicCare API.
//!
//! - `User`, `UserProfile`, `UserSettings`: the account snapshot
//! - Request/response bodies for the `auth/` endpoints

pub mod auth;
pub mod user;

pub use auth::{AuthResponse, LoginRequest, RegisterProfile, RegisterRequest, RegisterResponse};
pub use user::{User, UserProfile, UserSettings};
