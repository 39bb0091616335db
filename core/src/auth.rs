//! Sign-in and the in-memory session.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::ApiError;

pub const SIGNIN_PATH: &str = "/api/auth/signin";

/// Role the back office treats as administrator.
pub const ADMIN_ROLE: &str = "ROLE_USER";

pub const SESSION_EXPIRED: &str = "Sesión expirada. Por favor, inicia sesión nuevamente.";
const BAD_CREDENTIALS: &str = "Credenciales incorrectas";
const CONNECTION_FAILED: &str = "Error de conexión. Inténtalo de nuevo.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigninRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub id: i64,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl From<&AuthResponse> for User {
    fn from(auth: &AuthResponse) -> Self {
        Self {
            id: auth.id,
            username: auth.username.clone(),
            email: auth.email.clone(),
            roles: auth.roles.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// User-facing authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub message: String,
    pub status: Option<u16>,
}

impl AuthError {
    pub fn session_expired() -> Self {
        Self {
            message: SESSION_EXPIRED.to_string(),
            status: Some(401),
        }
    }

    fn from_signin(error: &ApiError) -> Self {
        match error {
            ApiError::Http { status, message, .. } => Self {
                message: message.clone().unwrap_or_else(|| BAD_CREDENTIALS.to_string()),
                status: Some(*status),
            },
            _ => Self {
                message: CONNECTION_FAILED.to_string(),
                status: None,
            },
        }
    }
}

/// Holds the signed-in session. Clones share it.
#[derive(Debug, Clone)]
pub struct AuthService {
    client: ApiClient,
    session: Arc<RwLock<Option<Session>>>,
}

impl AuthService {
    /// `client` is used unauthenticated for sign-in and as the base for
    /// `authenticated_client`.
    pub fn new(client: ApiClient) -> Self {
        Self {
            client: client.without_token(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    fn session(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub async fn signin(&self, request: &SigninRequest) -> Result<AuthResponse, AuthError> {
        let auth: AuthResponse = self
            .client
            .post(SIGNIN_PATH, Some(request), None)
            .await
            .map_err(|e| {
                tracing::warn!(username = %request.username, error = %e, "sign-in failed");
                AuthError::from_signin(&e)
            })?;
        tracing::info!(username = %auth.username, "signed in");
        self.set_session(&auth);
        Ok(auth)
    }

    /// Install a session from an existing sign-in response.
    pub fn set_session(&self, auth: &AuthResponse) {
        self.replace_session(Some(Session {
            token: auth.token.clone(),
            user: User::from(auth),
        }));
    }

    pub fn current_user(&self) -> Option<User> {
        self.session().as_ref().map(|s| s.user.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.session().as_ref().map(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.session()
            .as_ref()
            .is_some_and(|s| s.user.roles.iter().any(|r| r == ADMIN_ROLE))
    }

    pub fn logout(&self) {
        if let Some(user) = self.current_user() {
            tracing::info!(username = %user.username, "logged out");
        }
        self.replace_session(None);
    }

    /// Drop the session after the server rejected its token.
    pub fn expire_session(&self) -> AuthError {
        tracing::warn!("session expired");
        self.replace_session(None);
        AuthError::session_expired()
    }

    /// Client carrying the current bearer token, or none when signed out.
    pub fn authenticated_client(&self) -> ApiClient {
        match self.token() {
            Some(token) => self.client.with_token(&token),
            None => self.client.clone(),
        }
    }
}
