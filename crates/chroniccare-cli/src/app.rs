//! Application state and command handlers for the ChronicCare CLI.
//!
//! Each handler plays the part of one screen: it checks the form, calls the
//! session client, and renders a single line for the outcome.

use std::io::{self, Write};

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use chroniccare_core::api::ApiClient;
use chroniccare_core::config::Config;
use chroniccare_core::forms::{self, LoginForm, SignupForm};
use chroniccare_core::{SessionState, TokenStore};

/// Fields for `register` that may come from flags; missing ones are prompted.
#[derive(Debug, Default)]
pub struct SignupArgs {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Where a successful registration left the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The backend issued tokens and the new session is stored.
    SignedIn { username: String },
    /// Account created without tokens; the user has to log in.
    LoginRequired { username: String },
}

pub struct App {
    pub config: Config,
    api: ApiClient,
}

impl App {
    pub fn new(config: Config, passphrase: Option<&str>) -> Result<Self> {
        let store = config.open_store(passphrase)?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let api = ApiClient::from_config(&config, store)?;
        let state = api.session().load();
        debug!(?state, base_url = api.base_url(), "App initialized");
        Ok(Self { config, api })
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.is_authenticated()
    }

    /// Interactive login
    pub async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username {
            Some(username) => username,
            None => self.prompt_username()?,
        };
        let password = prompt_password("Password: ")?;

        let form = LoginForm::new(username, password);
        form.validate().map_err(|message| anyhow!(message))?;

        println!("Signing in...");
        match self.api.login(&form.username, &form.password).await {
            Ok(auth) => {
                self.config.last_username = Some(form.username.clone());
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                println!("Welcome, {}!", auth.user.display_name());
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                Err(anyhow!(forms::login_error_message(&e)))
            }
        }
    }

    /// Interactive account creation
    pub async fn register(&mut self, args: SignupArgs) -> Result<()> {
        let form = SignupForm {
            full_name: prompt_if_missing(args.name, "Name (first and last): ")?,
            email: prompt_if_missing(args.email, "Email address: ")?,
            phone_number: prompt_if_missing(args.phone, "Phone number: ")?,
            password: prompt_password("Password: ")?,
            confirm_password: prompt_password("Confirm password: ")?,
        };

        println!("Creating account...");
        match self.submit_registration(&form, Local::now().date_naive()).await? {
            Registration::SignedIn { username } => {
                self.config.last_username = Some(username);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                println!("Account created. You are now signed in.");
            }
            Registration::LoginRequired { username } => {
                println!(
                    "Account created. Sign in with `chroniccare login --username {}`.",
                    username
                );
            }
        }
        Ok(())
    }

    /// Check the form and register. Whether the user is signed in afterwards
    /// depends only on the tokens in this response, not on any session that
    /// was already stored.
    pub async fn submit_registration(
        &self,
        form: &SignupForm,
        today: NaiveDate,
    ) -> Result<Registration> {
        form.validate().map_err(|message| anyhow!(message))?;
        let request = form.to_request(today);

        match self.api.register(&request).await {
            Ok(registered) if registered.access.is_some() && registered.refresh.is_some() => {
                Ok(Registration::SignedIn {
                    username: request.username,
                })
            }
            Ok(_) => Ok(Registration::LoginRequired {
                username: request.username,
            }),
            Err(e) => {
                warn!(error = %e, "Registration failed");
                Err(anyhow!(forms::registration_error_message(&e)))
            }
        }
    }

    /// Logout always succeeds from the user's point of view: the local
    /// session is gone even if the server could not be told.
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "Server logout failed");
        }
        info!("Session cleared");
        println!("Signed out.");
        Ok(())
    }

    pub fn status(&self) {
        match self.api.session().state() {
            SessionState::Authenticated => match self.api.current_user() {
                Some(user) => println!("Signed in as {} ({})", user.display_name(), user.username),
                None => println!("Signed in"),
            },
            SessionState::Anonymous => println!("Not signed in"),
        }
    }

    /// Show the account as the server currently has it.
    pub async fn profile(&self) -> Result<()> {
        if !self.is_authenticated() {
            return Err(anyhow!("Not signed in. Run `chroniccare login` first."));
        }

        match self.api.fetch_profile().await {
            Ok(user) => {
                println!("{}", serde_json::to_string_pretty(&user)?);
                Ok(())
            }
            Err(e) if e.requires_login() => {
                warn!(error = %e, "Session ended");
                Err(anyhow!("Your session has expired. Please sign in again."))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn prompt_username(&self) -> Result<String> {
        match self.config.last_username {
            Some(ref last_user) => {
                let input = prompt_line(&format!("Username [{}]: ", last_user))?;
                if input.is_empty() {
                    Ok(last_user.clone())
                } else {
                    Ok(input)
                }
            }
            None => prompt_line("Username: "),
        }
    }
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_if_missing(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt_line(label),
    }
}

fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(label)?;
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chroniccare_core::auth::{MemoryTokenStore, StoreKey};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn signup_form() -> SignupForm {
        SignupForm {
            full_name: "Carol Jones".to_string(),
            email: "carol@example.com".to_string(),
            phone_number: "+1 123-5678".to_string(),
            password: "s3cret-pass".to_string(),
            confirm_password: "s3cret-pass".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    async fn setup() -> (MockServer, App, Arc<MemoryTokenStore>) {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::new());
        let config = Config {
            api_base_url: format!("{}/api/", server.uri()),
            ..Config::default()
        };
        let app = App::with_store(config, store.clone()).unwrap();
        (server, app, store)
    }

    fn carol_json() -> serde_json::Value {
        json!({"id": 7, "username": "carol", "email": "carol@example.com"})
    }

    #[tokio::test]
    async fn test_register_without_tokens_over_stale_session_requires_login() {
        let (server, app, store) = setup().await;
        store.set(StoreKey::AccessToken, "OLD").unwrap();
        store.set(StoreKey::RefreshToken, "OLDR").unwrap();
        Mock::given(method("POST"))
            .and(path("/api/auth/register/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "user": carol_json() })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = app.submit_registration(&signup_form(), today()).await.unwrap();

        assert_eq!(
            outcome,
            Registration::LoginRequired {
                username: "carol".to_string()
            }
        );
        // The earlier session is left untouched
        assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("OLD"));
    }

    #[tokio::test]
    async fn test_register_with_tokens_signs_in() {
        let (server, app, store) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "access": "A1",
                "refresh": "R1",
                "user": carol_json()
            })))
            .mount(&server)
            .await;

        let outcome = app.submit_registration(&signup_form(), today()).await.unwrap();

        assert_eq!(
            outcome,
            Registration::SignedIn {
                username: "carol".to_string()
            }
        );
        assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("A1"));
        assert!(app.is_authenticated());
    }

    #[tokio::test]
    async fn test_register_password_mismatch_skips_network() {
        let (server, app, _) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register/"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let form = SignupForm {
            confirm_password: "different".to_string(),
            ..signup_form()
        };
        let err = app.submit_registration(&form, today()).await.unwrap_err();
        assert_eq!(err.to_string(), forms::PASSWORD_MISMATCH);
    }

    #[tokio::test]
    async fn test_register_rejection_renders_field_errors() {
        let (server, app, _) = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "username": ["A user with that username already exists."]
            })))
            .mount(&server)
            .await;

        let err = app.submit_registration(&signup_form(), today()).await.unwrap_err();
        assert_eq!(err.to_string(), "A user with that username already exists.");
    }
}
