//! Shared error types for the services crate.

use thiserror::Error;

use lesson_core::model::LessonId;
use lesson_core::{CatalogError, QuizError};
use storage::rest::RestInitError;
use storage::sqlite::SqliteInitError;

/// Errors from the auth collaborator, worded for display to the learner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("Password should be at least {min} characters")]
    WeakPassword { min: usize },
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("User already registered")]
    AlreadyRegistered,
    /// Message passed through unchanged from the provider.
    #[error("{0}")]
    Provider(String),
}

/// Errors emitted by `LearnerSession`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LearnerError {
    #[error("sign in to start a lesson")]
    SignedOut,
    #[error("lesson {0} does not exist")]
    UnknownLesson(LessonId),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Errors from reading `AppConfig`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("unknown record store backend: {0} (expected sqlite, memory or rest)")]
    UnknownStore(String),
    #[error("{0} must be set when using the rest record store")]
    MissingRestSetting(&'static str),
    #[error("invalid {key} value: {raw}")]
    InvalidNumber { key: &'static str, raw: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Rest(#[from] RestInitError),
}
