//! Identity service and session gate.
//!
//! `AuthService` is the in-process stand-in for the external identity
//! provider: it registers accounts and issues opaque session tokens.
//! `Session` is the gate handed to UI code — every document operation
//! resolves `current_user()` through it first, and a signed-out session
//! yields `None` so dependent components deny the operation rather than
//! crash.
//!
//! Roster and editor operations take an explicit `&UserIdentity`
//! argument; nothing reads ambient global auth state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use folio_core::{CollabError, UserIdentity};

struct AuthState {
    /// Registered account emails
    accounts: HashSet<String>,
    /// Active session tokens
    sessions: HashMap<Uuid, String>,
}

/// In-process identity service.
///
/// Password verification belongs to the real identity provider and is
/// not modeled; an account is its email.
#[derive(Clone)]
pub struct AuthService {
    state: Arc<RwLock<AuthState>>,
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(AuthState {
                accounts: HashSet::new(),
                sessions: HashMap::new(),
            })),
        }
    }

    /// Register a new account.
    ///
    /// Rejects empty/whitespace emails, emails without `@`, and
    /// duplicate registrations.
    pub async fn register(&self, email: &str) -> Result<(), CollabError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(CollabError::Validation("email must not be empty".into()));
        }
        if !email.contains('@') {
            return Err(CollabError::Validation(format!(
                "'{email}' is not a valid email address"
            )));
        }

        let mut state = self.state.write().await;
        if !state.accounts.insert(email.to_string()) {
            return Err(CollabError::Validation(format!(
                "account '{email}' already registered"
            )));
        }
        log::info!("account '{email}' registered");
        Ok(())
    }

    /// Sign in, issuing a fresh opaque session token.
    pub async fn sign_in(&self, email: &str) -> Result<Session, CollabError> {
        let email = email.trim();
        let mut state = self.state.write().await;
        if !state.accounts.contains(email) {
            return Err(CollabError::NotFound(format!("account '{email}'")));
        }

        let token = Uuid::new_v4();
        state.sessions.insert(token, email.to_string());
        log::info!("'{email}' signed in");
        Ok(Session {
            token,
            service: self.clone(),
        })
    }

    /// Resolve the user behind a token, if the session is still live.
    pub async fn current_user(&self, token: Uuid) -> Option<UserIdentity> {
        let state = self.state.read().await;
        state
            .sessions
            .get(&token)
            .map(|email| UserIdentity::new(email.clone()))
    }

    /// Invalidate a token. Idempotent — an unknown token is a no-op.
    pub async fn sign_out(&self, token: Uuid) {
        let mut state = self.state.write().await;
        if let Some(email) = state.sessions.remove(&token) {
            log::info!("'{email}' signed out");
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

/// The session gate.
///
/// Holds only the opaque token — never credentials. All identity state
/// lives in the service, so sign-out is visible through every clone of
/// the gate.
#[derive(Clone)]
pub struct Session {
    token: Uuid,
    service: AuthService,
}

impl Session {
    /// The acting user, or `None` once signed out.
    pub async fn current_user(&self) -> Option<UserIdentity> {
        self.service.current_user(self.token).await
    }

    /// End the session. Idempotent.
    pub async fn sign_out(&self) {
        self.service.sign_out(self.token).await;
    }

    pub fn token(&self) -> Uuid {
        self.token
    }
}
