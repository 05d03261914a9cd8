//! Auth collaborator contract and an in-process implementation.

use std::sync::Arc;

use async_trait::async_trait;
use lesson_core::model::{Identity, IdentityId};
use storage::repository::{AccountRecord, AccountRepository, InMemoryRepository, StorageError};
use tokio::sync::watch;

use crate::error::AuthError;

/// Minimum password length accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

/// External identity provider.
///
/// The engine never verifies credentials itself; it only reacts to the session
/// published through `subscribe`.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The identity of the currently signed-in account, if any.
    async fn current_session(&self) -> Option<Identity>;

    /// Notifications for every session change. The initial value is the current session.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;

    /// # Errors
    ///
    /// Returns `AuthError` with a learner-facing message on failure.
    async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError` with a learner-facing message on failure.
    async fn sign_up(&self, email: &str, password: &str, display_name: &str)
    -> Result<(), AuthError>;

    async fn sign_out(&self);
}

/// Reject blank sign-in input before it reaches the provider.
///
/// # Errors
///
/// Returns `AuthError::MissingFields` if either value is blank.
pub fn validate_sign_in(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AuthError::MissingFields);
    }
    Ok(())
}

/// Reject blank sign-up input before it reaches the provider.
///
/// # Errors
///
/// Returns `AuthError::MissingFields` if any value is blank.
pub fn validate_sign_up(email: &str, password: &str, display_name: &str) -> Result<(), AuthError> {
    validate_sign_in(email, password)?;
    if display_name.trim().is_empty() {
        return Err(AuthError::MissingFields);
    }
    Ok(())
}

/// Accounts with bcrypt password hashes, kept in an [`AccountRepository`].
///
/// Sign-up signs the new account in immediately, like a hosted provider with
/// email confirmation disabled. Backed by a durable repository, an account and
/// its identity id survive restarts, so stored progress stays reachable.
pub struct LocalAuthProvider {
    accounts: Arc<dyn AccountRepository>,
    session: watch::Sender<Option<Identity>>,
    cost: u32,
}

impl LocalAuthProvider {
    /// Accounts kept in process memory only.
    #[must_use]
    pub fn new(cost: u32) -> Self {
        Self::with_accounts(Arc::new(InMemoryRepository::new()), cost)
    }

    #[must_use]
    pub fn with_accounts(accounts: Arc<dyn AccountRepository>, cost: u32) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts,
            session,
            cost,
        }
    }

    fn login(email: &str) -> String {
        email.trim().to_lowercase()
    }
}

fn provider_error(err: StorageError) -> AuthError {
    AuthError::Provider(err.to_string())
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn current_session(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        validate_sign_in(email, password)?;
        let account = self
            .accounts
            .get_account(&Self::login(email))
            .await
            .map_err(provider_error)?
            .ok_or(AuthError::InvalidCredentials)?;
        let ok = bcrypt::verify(password, &account.password_hash)
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(identity = %account.identity.id, "signed in");
        self.session.send_replace(Some(account.identity));
        Ok(())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(), AuthError> {
        validate_sign_up(email, password, display_name)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword {
                min: MIN_PASSWORD_LEN,
            });
        }

        let password_hash =
            bcrypt::hash(password, self.cost).map_err(|e| AuthError::Provider(e.to_string()))?;
        let identity = Identity::new(IdentityId::random(), display_name.trim(), email.trim());
        let account = AccountRecord {
            login: Self::login(email),
            identity: identity.clone(),
            password_hash,
        };
        match self.accounts.insert_account(&account).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => return Err(AuthError::AlreadyRegistered),
            Err(err) => return Err(provider_error(err)),
        }

        tracing::info!(identity = %identity.id, "account created");
        self.session.send_replace(Some(identity));
        Ok(())
    }

    async fn sign_out(&self) {
        if self.session.send_replace(None).is_some() {
            tracing::info!("signed out");
        }
    }
}
