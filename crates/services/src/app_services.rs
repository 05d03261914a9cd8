use std::sync::Arc;

use lesson_core::Catalog;
use storage::repository::Storage;

use crate::Clock;
use crate::auth::{AuthProvider, LocalAuthProvider};
use crate::config::{AppConfig, StoreBackend};
use crate::error::AppServicesError;
use crate::learner::LearnerSession;

/// Assembles the record store, lesson catalog and auth provider.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    storage: Storage,
    catalog: Arc<Catalog>,
    auth: Arc<dyn AuthProvider>,
}

impl AppServices {
    /// Build services for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the catalog cannot be loaded or the record
    /// store cannot be initialized.
    pub async fn build(config: &AppConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = match &config.store {
            StoreBackend::Sqlite { url } => Storage::sqlite(url).await?,
            StoreBackend::Memory => Storage::in_memory(),
            StoreBackend::Rest(rest) => Storage::rest(rest.clone())?,
        };

        let catalog = match &config.catalog_path {
            Some(path) => Catalog::from_json_path(path)?,
            None => Catalog::builtin(),
        };
        tracing::info!(lessons = catalog.len(), "lesson catalog loaded");

        let auth: Arc<dyn AuthProvider> = Arc::new(LocalAuthProvider::with_accounts(
            Arc::clone(&storage.accounts),
            config.bcrypt_cost,
        ));
        Ok(Self::from_parts(clock, storage, Arc::new(catalog), auth))
    }

    fn from_parts(
        clock: Clock,
        storage: Storage,
        catalog: Arc<Catalog>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            clock,
            storage,
            catalog,
            auth,
        }
    }

    /// A new learner session bound to the shared auth provider.
    #[must_use]
    pub fn learner_session(&self) -> LearnerSession {
        LearnerSession::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.auth),
            &self.storage,
            self.clock,
        )
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }
}
