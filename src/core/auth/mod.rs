// ─── Auth ───
// Identity and launch authorization collaborators. Login itself happens
// outside the core; the core only consumes its result and asks the backend
// for permission to start the client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::state::AuthState;

pub const DEFAULT_ACCESS_ENDPOINT: &str = "http://127.0.0.1:5000/api/request-game-access";
pub const DEFAULT_ACCESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a username/password login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub success: bool,
    pub message: String,
    pub account_id: Option<u64>,
    pub username: Option<String>,
}

/// Performs account login. Implemented outside the core.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> LauncherResult<AuthResult>;
}

/// A logged-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub username: String,
    pub account_id: u64,
}

impl AuthenticatedUser {
    pub fn from_result(result: &AuthResult) -> Option<Self> {
        if !result.success {
            return None;
        }
        Some(Self {
            username: result.username.clone()?,
            account_id: result.account_id?,
        })
    }

    /// Session restored from persisted settings; needs both username and id.
    pub fn restore(auth: &AuthState) -> Option<Self> {
        let username = auth.username.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        Some(Self {
            username: username.to_string(),
            account_id: auth.account_id?,
        })
    }
}

/// Backend gate consulted before every launch.
#[async_trait]
pub trait AccessAuthorizer: Send + Sync {
    /// `Ok(())` when the backend grants access. Must distinguish
    /// `NetworkUnavailable` from `AccessDenied`.
    async fn authorize(&self, username: &str) -> LauncherResult<()>;
}

#[derive(Serialize)]
struct AccessRequest<'a> {
    username: &'a str,
}

/// Posts `{"username": ...}` to the backend; HTTP 200 grants access.
pub struct HttpAccessAuthorizer {
    client: Client,
    endpoint: String,
}

impl HttpAccessAuthorizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> LauncherResult<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AccessAuthorizer for HttpAccessAuthorizer {
    async fn authorize(&self, username: &str) -> LauncherResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AccessRequest { username })
            .send()
            .await
            .map_err(|e| {
                warn!("Access request to {} failed: {}", self.endpoint, e);
                LauncherError::NetworkUnavailable(e.to_string())
            })?;

        let status = response.status();
        if status.as_u16() == 200 {
            info!("Game access granted for {}", username);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Game access denied for {} (HTTP {})", username, status.as_u16());
        Err(LauncherError::AccessDenied {
            status: status.as_u16(),
            body,
        })
    }
}
