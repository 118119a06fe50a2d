//! Session client for the ChronicCare REST API.
//!
//! `ApiClient` wraps every call with the stored access token. When the backend
//! answers 401, the client refreshes the access token once and replays the
//! request; if that cannot be done the session is ended.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::error::{detail_message, flatten_field_errors};
use super::ApiError;
use crate::auth::{CredentialPair, Session, TokenStore};
use crate::config::Config;
use crate::models::auth::{RefreshResponse, TokenRequest};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, RegisterResponse, User};

// ============================================================================
// Constants
// ============================================================================

/// Default base URL. 10.0.2.2 is the host machine as seen from the Android
/// emulator, where the development backend runs.
pub const DEFAULT_BASE_URL: &str = "http://10.0.2.2:8000/api/";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Times a request is replayed after refreshing its access token.
const MAX_REFRESH_RETRIES: u32 = 1;

/// Shown when login fails and the backend gave no `detail`.
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your credentials.";

/// Shown when registration fails and the backend gave no field errors.
pub const REGISTRATION_FAILED_MESSAGE: &str = "Registration failed";

const LOGIN_PATH: &str = "auth/login/";
const REGISTER_PATH: &str = "auth/register/";
const REFRESH_PATH: &str = "auth/refresh/";
const LOGOUT_PATH: &str = "auth/logout/";
const PROFILE_PATH: &str = "profile/";

/// A request that can be rebuilt for every attempt.
struct PendingRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    /// Attach the bearer token and recover from 401 by refreshing.
    authenticated: bool,
}

impl PendingRequest {
    fn authenticated(method: Method, path: &str, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.to_string(),
            body,
            authenticated: true,
        }
    }

    fn anonymous(method: Method, path: &str, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.to_string(),
            body,
            authenticated: false,
        }
    }
}

/// Client for the ChronicCare API.
/// Clone is cheap - the connection pool, token store and refresh lock are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Session,
    /// Held for the duration of a token refresh so concurrent 401s share one.
    refresh_lock: Arc<Mutex<()>>,
}

impl ApiClient {
    /// Create a client with the default request timeout
    pub fn new(base_url: &str, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS), store)
    }

    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            session: Session::new(store),
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn from_config(config: &Config, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::with_timeout(&config.api_base_url, config.request_timeout(), store)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// True iff an access token is stored. The token itself is not validated.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// The user snapshot cached at the last login or registration.
    pub fn current_user(&self) -> Option<User> {
        self.session.user()
    }

    // ===== Account Operations =====

    /// Log in and store the issued tokens and user snapshot.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = encode(&LoginRequest { username, password })?;
        let response = self
            .execute(&PendingRequest::anonymous(Method::POST, LOGIN_PATH, Some(body)))
            .await
            .inspect_err(|e| error!(error = %e, "Login request failed"))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            warn!(username, %status, "Login rejected");
            let message = detail_message(&body).unwrap_or_else(|| LOGIN_FAILED_MESSAGE.to_string());
            return Err(ApiError::Auth(message));
        }

        let response = Self::check_response(response).await?;
        let auth: AuthResponse = Self::parse_json(response).await?;

        self.session
            .save_credentials(&CredentialPair::new(&auth.access, &auth.refresh))?;
        self.session.save_user(&auth.user)?;
        info!(username, "Login successful");
        Ok(auth)
    }

    /// Register an account. When the backend issues tokens the new session is
    /// stored; otherwise the caller must send the user to log in.
    pub async fn register(&self, registration: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        let body = encode(registration)?;
        let response = self
            .execute(&PendingRequest::anonymous(Method::POST, REGISTER_PATH, Some(body)))
            .await
            .inspect_err(|e| error!(error = %e, "Registration request failed"))?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            let message = detail_message(&body)
                .or_else(|| flatten_field_errors(&body))
                .unwrap_or_else(|| REGISTRATION_FAILED_MESSAGE.to_string());
            warn!(username = %registration.username, %message, "Registration rejected");
            return Err(ApiError::Validation(message));
        }

        let response = Self::check_response(response).await?;
        let registered: RegisterResponse = Self::parse_json(response).await?;

        match (&registered.access, &registered.refresh) {
            (Some(access), Some(refresh)) => {
                self.session
                    .save_credentials(&CredentialPair::new(access, refresh))?;
                self.session.save_user(&registered.user)?;
                info!(username = %registration.username, "Registered and signed in");
            }
            _ => info!(username = %registration.username, "Registered; login required"),
        }
        Ok(registered)
    }

    /// End the session.
    ///
    /// Local tokens and the user snapshot are always deleted, even when the
    /// remote call fails. The remote failure is still returned so callers can
    /// report it; local state is clean either way.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let remote = match self.session.refresh_token() {
            Some(refresh) => self.revoke(&refresh).await,
            None => {
                debug!("No refresh token stored, skipping remote logout");
                Ok(())
            }
        };

        let local = self.session.clear();

        if let Err(ref e) = remote {
            warn!(error = %e, "Remote logout failed, local session cleared");
        }
        local?;
        remote?;
        info!("Logged out");
        Ok(())
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), ApiError> {
        let body = encode(&TokenRequest {
            refresh: refresh_token,
        })?;
        let response = self
            .execute(&PendingRequest::authenticated(Method::POST, LOGOUT_PATH, Some(body)))
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    /// Fetch the signed-in user's account from the server.
    pub async fn fetch_profile(&self) -> Result<User, ApiError> {
        self.get_json(PROFILE_PATH).await
    }

    // ===== Authenticated Requests =====

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(Method::GET, path, None).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request_json(Method::POST, path, Some(encode(body)?))
            .await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request_json(Method::PUT, path, Some(encode(body)?))
            .await
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let response = self
            .execute(&PendingRequest::authenticated(method, path, body))
            .await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    // ===== Interceptor =====

    /// Send a request, recovering once from an expired access token.
    ///
    /// Returns the final response whatever its status. A 401 on the replayed
    /// request is returned as-is, never replayed again.
    async fn execute(&self, request: &PendingRequest) -> Result<Response, ApiError> {
        let mut token = if request.authenticated {
            self.session.access_token()
        } else {
            None
        };
        let mut retries = 0;

        loop {
            let response = self.send(request, token.as_deref()).await?;

            if !request.authenticated || response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
            if retries >= MAX_REFRESH_RETRIES {
                warn!(path = %request.path, "Still unauthorized after token refresh");
                return Ok(response);
            }

            retries += 1;
            token = Some(self.refresh_access_token(token.as_deref()).await?);
            debug!(path = %request.path, retry = retries, "Replaying request with refreshed token");
        }
    }

    async fn send(&self, request: &PendingRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let url = self.url(&request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), url.as_str())
            .header(header::ACCEPT, "application/json");
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(method = %request.method, url = %url, error = %e, "Request failed");
            ApiError::Network(e)
        })?;
        debug!(method = %request.method, url = %url, status = %response.status(), "Response received");
        Ok(response)
    }

    /// Obtain a fresh access token after `rejected` got a 401.
    ///
    /// Refreshes are single-flight: a caller that waited on another refresh
    /// picks up the token it stored instead of refreshing again.
    async fn refresh_access_token(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.session.access_token() {
            if rejected != Some(current.as_str()) {
                debug!("Using access token refreshed by a concurrent request");
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.session.refresh_token() else {
            warn!("Access token rejected and no refresh token stored");
            self.end_session();
            return Err(ApiError::SessionExpired(
                "No refresh token available".to_string(),
            ));
        };

        match self.request_refresh(&refresh_token).await {
            Ok(access) => {
                self.session.update_access_token(&access)?;
                info!("Access token refreshed");
                Ok(access)
            }
            Err(e) => {
                error!(error = %e, "Token refresh failed");
                self.end_session();
                Err(ApiError::SessionExpired(e.to_string()))
            }
        }
    }

    /// The refresh call itself bypasses the interceptor.
    async fn request_refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .header(header::ACCEPT, "application/json")
            .json(&TokenRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let refreshed: RefreshResponse = Self::parse_json(response).await?;
        Ok(refreshed.access)
    }

    fn end_session(&self) {
        if let Err(e) = self.session.clear_tokens() {
            warn!(error = %e, "Failed to clear tokens after refresh failure");
        }
    }

    // ===== Helpers =====

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().to_string();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(ApiError::Encode)
}

/// Base URLs are joined with relative paths, so they always end in `/`.
fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, StoreKey};
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::models::RegisterProfile;

    fn user_json(username: &str) -> Value {
        json!({
            "id": 1,
            "username": username,
            "email": format!("{}@example.com", username),
            "first_name": "",
            "last_name": ""
        })
    }

    async fn setup() -> (MockServer, ApiClient, Arc<MemoryTokenStore>) {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::new());
        let client = ApiClient::new(&format!("{}/api", server.uri()), store.clone()).unwrap();
        (server, client, store)
    }

    fn sign_in(store: &MemoryTokenStore, access: &str, refresh: Option<&str>) {
        store.set(StoreKey::AccessToken, access).unwrap();
        if let Some(refresh) = refresh {
            store.set(StoreKey::RefreshToken, refresh).unwrap();
        }
        store
            .set(StoreKey::UserData, &user_json("alice").to_string())
            .unwrap();
    }

    async fn mount_refresh(server: &MockServer, refresh: &str, access: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh/"))
            .and(body_json(json!({ "refresh": refresh })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": access })))
            .expect(times)
            .mount(server)
            .await;
    }

    fn registration() -> RegisterRequest {
        RegisterRequest {
            username: "carol".to_string(),
            email: "carol@example.com".to_string(),
            first_name: "Carol".to_string(),
            last_name: "Jones".to_string(),
            password: "s3cret-pass".to_string(),
            password2: "s3cret-pass".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2000, 1, 2).unwrap(),
            profile: RegisterProfile {
                phone_number: "+1 123-5678".to_string(),
            },
        }
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://host/api"), "http://host/api/");
        assert_eq!(normalize_base_url("http://host/api/"), "http://host/api/");
        assert_eq!(normalize_base_url(" http://host/ "), "http://host/");
    }

    #[tokio::test]
    async fn test_login_stores_tokens_and_user() {
        let (server, client, store) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .and(body_json(json!({ "username": "alice", "password": "correct" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access": "A1",
                "refresh": "R1",
                "user": user_json("alice")
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert!(!client.is_authenticated());
        let auth = client.login("alice", "correct").await.unwrap();

        assert_eq!(auth.access, "A1");
        assert!(client.is_authenticated());
        assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("A1"));
        assert_eq!(store.get(StoreKey::RefreshToken).as_deref(), Some("R1"));
        assert_eq!(client.current_user().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_login_wrong_password_stores_nothing() {
        let (server, client, store) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid Credentials" })),
            )
            .mount(&server)
            .await;
        mount_refresh(&server, "R0", "unused", 0).await;
        // A leftover refresh token must not turn a bad login into a refresh
        store.set(StoreKey::RefreshToken, "R0").unwrap();

        let err = client.login("alice", "wrong").await.unwrap_err();

        assert!(matches!(&err, ApiError::Auth(_)));
        assert_eq!(err.to_string(), LOGIN_FAILED_MESSAGE);
        assert!(!client.is_authenticated());
        assert!(client.current_user().is_none());
    }

    #[tokio::test]
    async fn test_login_propagates_backend_detail() {
        let (server, client, _) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "detail": "No active account found with the given credentials"
            })))
            .mount(&server)
            .await;

        let err = client.login("alice", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "No active account found with the given credentials");
    }

    #[tokio::test]
    async fn test_register_with_tokens_signs_in() {
        let (server, client, store) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register/"))
            .and(body_json(json!({
                "username": "carol",
                "email": "carol@example.com",
                "first_name": "Carol",
                "last_name": "Jones",
                "password": "s3cret-pass",
                "password2": "s3cret-pass",
                "date_of_birth": "2000-01-02",
                "profile": { "phone_number": "+1 123-5678" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "access": "A1",
                "refresh": "R1",
                "user": user_json("carol")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registered = client.register(&registration()).await.unwrap();

        assert_eq!(registered.user.username, "carol");
        assert!(client.is_authenticated());
        assert_eq!(store.get(StoreKey::RefreshToken).as_deref(), Some("R1"));
        assert_eq!(client.current_user().unwrap().username, "carol");
    }

    #[tokio::test]
    async fn test_register_without_tokens_stays_anonymous() {
        let (server, client, _) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register/"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "user": user_json("carol") })),
            )
            .mount(&server)
            .await;

        let registered = client.register(&registration()).await.unwrap();

        assert!(registered.access.is_none());
        assert!(!client.is_authenticated());
        assert!(client.current_user().is_none());
    }

    #[tokio::test]
    async fn test_register_flattens_field_errors() {
        let (server, client, _) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "username": ["A user with that username already exists."],
                "password": ["This password is too common."]
            })))
            .mount(&server)
            .await;

        let err = client.register(&registration()).await.unwrap_err();

        match err {
            ApiError::Validation(message) => assert_eq!(
                message,
                "A user with that username already exists., This password is too common."
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_register_empty_400_uses_fallback_message() {
        let (server, client, _) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register/"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = client.register(&registration()).await.unwrap_err();
        assert_eq!(err.to_string(), REGISTRATION_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_bearer_token_attached() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", Some("R1"));
        Mock::given(method("GET"))
            .and(path("/api/profile/"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json("alice")))
            .expect(1)
            .mount(&server)
            .await;

        let user = client.fetch_profile().await.unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_401_refreshes_and_replays_once() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", Some("R1"));
        Mock::given(method("GET"))
            .and(path("/api/profile/"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/profile/"))
            .and(header("authorization", "Bearer T2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json("alice")))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "R1", "T2", 1).await;

        let user = client.fetch_profile().await.unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("T2"));
        assert_eq!(store.get(StoreKey::RefreshToken).as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_expires_session() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", None);
        Mock::given(method("GET"))
            .and(path("/api/profile/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client.fetch_profile().await.unwrap_err();

        assert!(matches!(err, ApiError::SessionExpired(_)));
        assert!(err.requires_login());
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_replayed_401_is_not_retried_again() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", Some("R1"));
        Mock::given(method("GET"))
            .and(path("/api/profile/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh(&server, "R1", "T2", 1).await;

        let err = client.fetch_profile().await.unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_tokens() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", Some("R1"));
        Mock::given(method("GET"))
            .and(path("/api/profile/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "detail": "Token is invalid or expired"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client.fetch_profile().await.unwrap_err();

        assert!(matches!(err, ApiError::SessionExpired(_)));
        assert!(!client.is_authenticated());
        assert_eq!(store.get(StoreKey::RefreshToken), None);
    }

    #[tokio::test]
    async fn test_other_errors_propagate_without_refresh() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", Some("R1"));
        Mock::given(method("GET"))
            .and(path("/api/profile/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        mount_refresh(&server, "R1", "T2", 0).await;

        let err = client.fetch_profile().await.unwrap_err();

        assert!(matches!(err, ApiError::ServerError(ref body) if body == "boom"));
        assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", Some("R1"));
        Mock::given(method("GET"))
            .and(path("/api/profile/"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/profile/"))
            .and(header("authorization", "Bearer T2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json("alice")))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access": "T2" }))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (first, second) = tokio::join!(client.fetch_profile(), client.fetch_profile());

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_post_json_replays_body_after_refresh() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", Some("R1"));
        let entry = json!({ "pain_level": 4, "notes": "knee" });
        Mock::given(method("POST"))
            .and(path("/api/pain-entries/"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/pain-entries/"))
            .and(header("authorization", "Bearer T2"))
            .and(body_json(entry.clone()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9 })))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "R1", "T2", 1).await;

        let created: Value = client.post_json("pain-entries/", &entry).await.unwrap();
        assert_eq!(created["id"], 9);
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", Some("R1"));
        Mock::given(method("POST"))
            .and(path("/api/auth/logout/"))
            .and(header("authorization", "Bearer A1"))
            .and(body_json(json!({ "refresh": "R1" })))
            .respond_with(ResponseTemplate::new(205))
            .expect(1)
            .mount(&server)
            .await;

        client.logout().await.unwrap();

        assert!(!client.is_authenticated());
        for key in StoreKey::ALL {
            assert_eq!(store.get(key), None);
        }
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_remote_fails() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", Some("R1"));
        Mock::given(method("POST"))
            .and(path("/api/auth/logout/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = client.logout().await;

        assert!(matches!(result, Err(ApiError::ServerError(_))));
        assert!(!client.is_authenticated());
        assert!(client.current_user().is_none());
        assert_eq!(store.get(StoreKey::RefreshToken), None);
    }

    #[tokio::test]
    async fn test_logout_clears_when_server_unreachable() {
        let store = Arc::new(MemoryTokenStore::new());
        sign_in(&store, "A1", Some("R1"));
        // Nothing listens on the discard port
        let client = ApiClient::with_timeout(
            "http://127.0.0.1:9/api/",
            Duration::from_secs(2),
            store.clone(),
        )
        .unwrap();

        let result = client.logout().await;

        assert!(matches!(result, Err(ApiError::Network(_))));
        assert!(!client.is_authenticated());
        assert!(client.current_user().is_none());
    }

    #[tokio::test]
    async fn test_logout_without_refresh_token_skips_remote() {
        let (server, client, store) = setup().await;
        sign_in(&store, "A1", None);
        Mock::given(method("POST"))
            .and(path("/api/auth/logout/"))
            .respond_with(ResponseTemplate::new(205))
            .expect(0)
            .mount(&server)
            .await;

        client.logout().await.unwrap();

        assert!(!client.is_authenticated());
        assert!(client.current_user().is_none());
    }
}
