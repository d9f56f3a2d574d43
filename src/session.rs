use crate::errors::StoreError;
use crate::models::Credential;
use crate::store::RewardsStore;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::{Rng, distr::Alphanumeric};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tracing::info;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;
const TOKEN_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("a valid email is required")]
    InvalidEmail,

    #[error("password must be at least 6 characters")]
    WeakPassword,

    #[error("email is already registered")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("session expired or unknown")]
    InvalidToken,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn { user_id: String },
    SignedOut { user_id: String },
    TokenRefreshed { user_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

#[derive(Clone)]
pub struct SessionHub {
    store: Arc<dyn RewardsStore>,
    tokens: Arc<Mutex<HashMap<String, String>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHub {
    pub fn new(store: Arc<dyn RewardsStore>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            tokens: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The caller creates the profile.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let user_id = Uuid::new_v4().to_string();
        let credential = Credential {
            user_id: user_id.clone(),
            email: email.clone(),
            password_hash: hash_password(password)?,
        };
        match self.store.insert_credential(credential).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(AuthError::EmailTaken),
            Err(err) => return Err(err.into()),
        }

        info!(%email, %user_id, "user signed up");
        Ok(self.open_session(user_id).await)
    }

    /// Undoes `sign_up` when the account behind it could not be created.
    pub async fn abandon_sign_up(&self, session: &Session, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)?;
        self.tokens.lock().await.remove(&session.token);
        match self.store.get_credential(&email).await? {
            Some(credential) if credential.user_id == session.user_id => {
                self.store.delete_credential(&email).await?;
                info!(%email, user_id = %session.user_id, "sign-up rolled back");
            }
            _ => {}
        }
        Ok(())
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        let credential = self
            .store
            .get_credential(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed = PasswordHash::new(&credential.password_hash)
            .map_err(|err| AuthError::Hash(err.to_string()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)?;

        Ok(self.open_session(credential.user_id).await)
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let user_id = self
            .tokens
            .lock()
            .await
            .remove(token)
            .ok_or(AuthError::InvalidToken)?;
        let _ = self.events.send(SessionEvent::SignedOut { user_id });
        Ok(())
    }

    /// Swaps `token` for a fresh one bound to the same user.
    pub async fn refresh(&self, token: &str) -> Result<Session, AuthError> {
        let session = {
            let mut tokens = self.tokens.lock().await;
            let user_id = tokens.remove(token).ok_or(AuthError::InvalidToken)?;
            let token = new_token();
            tokens.insert(token.clone(), user_id.clone());
            Session { token, user_id }
        };
        let _ = self.events.send(SessionEvent::TokenRefreshed {
            user_id: session.user_id.clone(),
        });
        Ok(session)
    }

    pub async fn current_user(&self, token: &str) -> Option<String> {
        self.tokens.lock().await.get(token).cloned()
    }

    /// Accepts a reset request without revealing whether the email exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)?;
        if self.store.get_credential(&email).await?.is_some() {
            info!(%email, "password reset requested");
        }
        Ok(())
    }

    async fn open_session(&self, user_id: String) -> Session {
        let token = new_token();
        self.tokens
            .lock()
            .await
            .insert(token.clone(), user_id.clone());
        let _ = self.events.send(SessionEvent::SignedIn {
            user_id: user_id.clone(),
        });
        Session { token, user_id }
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AuthError::InvalidEmail),
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

fn new_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoreData;
    use crate::store::JsonStore;

    fn hub() -> SessionHub {
        SessionHub::new(Arc::new(JsonStore::in_memory(StoreData::default())))
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_resolves_same_user() {
        let hub = hub();
        let created = hub.sign_up("Me@Example.com", "hunter22").await.unwrap();
        let signed_in = hub
            .sign_in_with_password("me@example.com", "hunter22")
            .await
            .unwrap();

        assert_eq!(created.user_id, signed_in.user_id);
        assert_ne!(created.token, signed_in.token);
        assert_eq!(
            hub.current_user(&signed_in.token).await.as_deref(),
            Some(created.user_id.as_str())
        );
    }

    #[tokio::test]
    async fn wrong_password_and_duplicate_email_are_rejected() {
        let hub = hub();
        hub.sign_up("me@example.com", "hunter22").await.unwrap();

        assert!(matches!(
            hub.sign_in_with_password("me@example.com", "nope-nope").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            hub.sign_up("me@example.com", "another1").await,
            Err(AuthError::EmailTaken)
        ));
        assert!(matches!(
            hub.sign_up("not-an-email", "hunter22").await,
            Err(AuthError::InvalidEmail)
        ));
        assert!(matches!(
            hub.sign_up("x@example.com", "123").await,
            Err(AuthError::WeakPassword)
        ));
    }

    #[tokio::test]
    async fn abandoned_sign_up_frees_the_email() {
        let hub = hub();
        let session = hub.sign_up("me@example.com", "hunter22").await.unwrap();

        hub.abandon_sign_up(&session, "Me@Example.com").await.unwrap();

        assert!(hub.current_user(&session.token).await.is_none());
        assert!(matches!(
            hub.sign_in_with_password("me@example.com", "hunter22").await,
            Err(AuthError::InvalidCredentials)
        ));
        let retried = hub.sign_up("me@example.com", "hunter22").await.unwrap();
        assert_ne!(retried.user_id, session.user_id);
    }

    #[tokio::test]
    async fn lifecycle_events_are_broadcast() {
        let hub = hub();
        let mut events = hub.subscribe();

        let session = hub.sign_up("me@example.com", "hunter22").await.unwrap();
        let refreshed = hub.refresh(&session.token).await.unwrap();
        hub.sign_out(&refreshed.token).await.unwrap();

        let user_id = session.user_id.clone();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SignedIn {
                user_id: user_id.clone()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::TokenRefreshed {
                user_id: user_id.clone()
            }
        );
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut { user_id });
        assert!(hub.current_user(&session.token).await.is_none());
        assert!(hub.current_user(&refreshed.token).await.is_none());
    }

    #[tokio::test]
    async fn password_reset_does_not_leak_unknown_emails() {
        let hub = hub();
        assert!(hub.request_password_reset("ghost@example.com").await.is_ok());
        assert!(matches!(
            hub.request_password_reset("bad").await,
            Err(AuthError::InvalidEmail)
        ));
    }
}
