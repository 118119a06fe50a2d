use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Account as returned by the backend at login, registration, and `profile/`.
///
/// Cached locally as the user profile snapshot. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub settings: Option<UserSettings>,
}

impl User {
    /// Full name if the backend has one, otherwise the username.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub notification_preference: Option<String>,
    pub medications: Option<String>,
    pub chronic_illnesses: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_relationship: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub dark_mode: Option<bool>,
    pub language: Option<String>,
    pub notification_enabled: Option<bool>,
    pub reminder_frequency: Option<String>,
    pub health_app_sync: Option<bool>,
    pub health_app_type: Option<String>,
    pub community_enabled: Option<bool>,
    pub community_username: Option<String>,
    pub data_sharing: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_parses_backend_payload() {
        let json = r#"{
            "id": 7,
            "username": "alice",
            "email": "alice@example.com",
            "first_name": "Alice",
            "last_name": "Smith",
            "profile": {"date_of_birth": "1990-04-01", "phone_number": "+1 555-0100", "medications": null},
            "settings": {"dark_mode": true, "language": "en"},
            "is_staff": false
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, Some(7));
        assert_eq!(user.display_name(), "Alice Smith");

        let profile = user.profile.unwrap();
        assert_eq!(profile.date_of_birth, NaiveDate::from_ymd_opt(1990, 4, 1));
        assert_eq!(profile.phone_number.as_deref(), Some("+1 555-0100"));
        assert_eq!(user.settings.unwrap().dark_mode, Some(true));
    }

    #[test]
    fn test_user_minimal_payload() {
        let user: User = serde_json::from_str(r#"{"username": "bob"}"#).unwrap();
        assert_eq!(user.id, None);
        assert!(user.profile.is_none());
        assert_eq!(user.display_name(), "bob");
    }
}
