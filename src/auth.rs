use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::LocalUser;
use crate::error::{RebanhoError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Manager,
    #[default]
    Worker,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Manager => write!(f, "manager"),
            UserRole::Worker => write!(f, "worker"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manager" | "gerente" | "admin" => Ok(UserRole::Manager),
            "worker" | "funcionario" | "funcionário" | "operador" => Ok(UserRole::Worker),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Identifier + secret pair submitted to sign in.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Result<Self> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(RebanhoError::Validation(
                "email and password are required".to_string(),
            ));
        }
        Ok(Self {
            email,
            password: password.to_string(),
        })
    }
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    /// Bearer token for the remote store; `None` for local sign-ins.
    #[serde(default)]
    pub access_token: Option<String>,
    pub signed_in_at: DateTime<Utc>,
}

impl Session {
    pub fn is_manager(&self) -> bool {
        self.role == UserRole::Manager
    }

    /// Fail with `Forbidden` unless the user is a manager.
    pub fn require_manager(&self, action: &str) -> Result<()> {
        if self.is_manager() {
            Ok(())
        } else {
            Err(RebanhoError::Forbidden(action.to_string()))
        }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session>;

    async fn sign_out(&self, session: &Session) -> Result<()>;
}

/// Password sign-in against the hosted auth endpoint.
pub struct RemoteAuth {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

fn metadata_str<'a>(metadata: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| metadata.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

/// Name shown for a user without one: the part of the email before `@`.
fn name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

fn str_field<'a>(body: &'a Value, key: &str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn is_invalid_grant(body: &Value) -> bool {
    str_field(body, "error") == "invalid_grant"
        || str_field(body, "error_code") == "invalid_credentials"
        || ["error_description", "msg", "message"]
            .iter()
            .any(|k| str_field(body, k).contains("Invalid login credentials"))
}

impl RemoteAuth {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RebanhoError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Authenticator for RemoteAuth {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        debug!(email = %credentials.email, "remote sign-in");
        let response = self
            .client
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&json!({
                "email": credentials.email,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|e| RebanhoError::AuthFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            if status == StatusCode::BAD_REQUEST && is_invalid_grant(&body) {
                return Err(RebanhoError::InvalidCredentials);
            }
            return Err(RebanhoError::AuthFailed(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RebanhoError::AuthFailed(format!("malformed token response: {}", e)))?;

        let email = token
            .user
            .email
            .unwrap_or_else(|| credentials.email.clone());
        let metadata = &token.user.user_metadata;
        let name = metadata_str(metadata, &["nome", "name", "full_name"])
            .map(str::to_string)
            .unwrap_or_else(|| name_from_email(&email));
        let role: UserRole = metadata_str(metadata, &["role", "funcao", "cargo"])
            .and_then(|r| r.parse().ok())
            .unwrap_or_default();

        info!(email = %email, role = %role, "signed in");
        Ok(Session {
            name,
            email,
            role,
            access_token: Some(token.access_token),
            signed_in_at: Utc::now(),
        })
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let Some(token) = &session.access_token else {
            return Ok(());
        };

        let response = self
            .client
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| RebanhoError::AuthFailed(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "remote sign-out was not acknowledged");
        }
        Ok(())
    }
}

/// Sign-in against the users listed in the project config. Meant for
/// offline use and demos; passwords are compared as stored.
pub struct LocalAuth {
    users: Vec<LocalUser>,
}

impl LocalAuth {
    pub fn new(users: Vec<LocalUser>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authenticator for LocalAuth {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        if self.users.is_empty() {
            return Err(RebanhoError::AuthFailed(
                "no local users configured".to_string(),
            ));
        }

        let user = self
            .users
            .iter()
            .find(|u| {
                u.email.trim().eq_ignore_ascii_case(&credentials.email)
                    && u.password == credentials.password
            })
            .ok_or(RebanhoError::InvalidCredentials)?;

        info!(email = %credentials.email, role = %user.role, "signed in locally");
        Ok(Session {
            name: user
                .name
                .clone()
                .unwrap_or_else(|| name_from_email(&credentials.email)),
            email: credentials.email.clone(),
            role: user.role,
            access_token: None,
            signed_in_at: Utc::now(),
        })
    }

    async fn sign_out(&self, _session: &Session) -> Result<()> {
        Ok(())
    }
}
