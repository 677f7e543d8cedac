//! Registration, login and the single current-session pointer.

use crate::errors::{AppError, Result};
use crate::models::UserRecord;
use crate::storage::UserStore;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use chrono::Utc;
use rand::rngs::OsRng;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// The logged-in user an operation acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Turns a secret into the stored credential value and checks it later.
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String>;
    fn verify(&self, secret: &str, stored: &str) -> bool;
}

/// Argon2id with a random salt per credential.
#[derive(Debug, Clone, Default)]
pub struct Argon2Verifier {
    params: Option<Params>,
}

impl Argon2Verifier {
    pub fn with_params(params: Params) -> Self {
        Self {
            params: Some(params),
        }
    }

    fn argon2(&self) -> Argon2<'static> {
        match &self.params {
            Some(params) => Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone()),
            None => Argon2::default(),
        }
    }
}

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AppError::Internal(err.to_string()))
    }

    fn verify(&self, secret: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            warn!("stored credential is not a valid password hash");
            return false;
        };
        self.argon2()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn new_user_id() -> String {
    format!("user_{}", uuid::Uuid::new_v4().simple())
}

async fn off_runtime<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(AppError::internal)
}

fn email_taken(users: &BTreeMap<String, UserRecord>, wanted: &str) -> bool {
    users.values().any(|user| normalize_email(&user.email) == wanted)
}

/// Emails compare case-insensitively after trimming.
///
/// Hashing and verification run on the blocking pool with the store
/// unlocked; the lock is only taken to read candidates and to commit.
pub struct SessionManager<V = Argon2Verifier> {
    verifier: Arc<V>,
}

impl<V: CredentialVerifier + 'static> SessionManager<V> {
    pub fn new(verifier: V) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }

    pub async fn register(&self, store: &Mutex<UserStore>, email: &str, secret: &str) -> Result<String> {
        let email = email.trim();
        if email.is_empty() || secret.is_empty() {
            return Err(AppError::bad_request("email and password are required"));
        }
        let wanted = normalize_email(email);
        if email_taken(&store.lock().await.users()?, &wanted) {
            return Err(AppError::DuplicateEmail);
        }

        let verifier = Arc::clone(&self.verifier);
        let secret = secret.to_string();
        let credential = off_runtime(move || verifier.hash(&secret)).await??;

        let mut store = store.lock().await;
        let mut users = store.users()?;
        // Another registration may have taken the email while hashing.
        if email_taken(&users, &wanted) {
            return Err(AppError::DuplicateEmail);
        }
        let user_id = new_user_id();
        users.insert(user_id.clone(), UserRecord::new(email, credential, Utc::now()));
        store.put_all_and_set_session(users, &user_id).await?;

        info!(user_id = %user_id, "user registered");
        Ok(user_id)
    }

    /// Returns the id and stored email of the user now logged in.
    pub async fn login(
        &self,
        store: &Mutex<UserStore>,
        email: &str,
        secret: &str,
    ) -> Result<(String, String)> {
        let wanted = normalize_email(email);
        let candidates: Vec<(String, String)> = store
            .lock()
            .await
            .users()?
            .into_iter()
            .filter(|(_, user)| normalize_email(&user.email) == wanted)
            .map(|(id, user)| (id, user.credential_secret))
            .collect();

        let verifier = Arc::clone(&self.verifier);
        let secret = secret.to_string();
        let matched = off_runtime(move || {
            candidates
                .into_iter()
                .find(|(_, stored)| verifier.verify(&secret, stored))
                .map(|(id, _)| id)
        })
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        let mut store = store.lock().await;
        // The record may have gone while verifying.
        let user = store.get(&matched)?.ok_or(AppError::InvalidCredentials)?;
        store.set_current_session_id(&matched).await?;
        info!(user_id = %matched, "user logged in");
        Ok((matched, user.email))
    }

    pub async fn logout(&self, store: &mut UserStore) -> Result<()> {
        if let Some(user_id) = store.current_session_id() {
            info!(user_id = %user_id, "user logged out");
        }
        store.clear_current_session_id().await
    }
}

/// Resolves the current session, ignoring a pointer to a missing record.
pub fn current(store: &UserStore) -> Result<Option<SessionContext>> {
    let Some(user_id) = store.current_session_id() else {
        return Ok(None);
    };
    if store.get(&user_id)?.is_none() {
        warn!(user_id = %user_id, "current session points at a missing user");
        return Ok(None);
    }
    Ok(Some(SessionContext::new(user_id)))
}

/// Like [`current`], but a missing session is an error.
pub fn require(store: &UserStore) -> Result<SessionContext> {
    current(store)?.ok_or(AppError::NotLoggedIn)
}

#[cfg(test)]
pub(crate) fn test_verifier() -> Argon2Verifier {
    Argon2Verifier::with_params(Params::new(8, 1, 1, None).unwrap())
}
