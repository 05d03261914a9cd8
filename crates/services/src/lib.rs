#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth;
pub mod config;
pub mod error;
pub mod learner;
pub mod sync;

pub use lesson_core::Clock;

pub use app_services::AppServices;
pub use auth::{AuthProvider, LocalAuthProvider};
pub use config::{AppConfig, StoreBackend};
pub use error::{AppServicesError, AuthError, ConfigError, LearnerError};
pub use learner::{AdvanceOutcome, LearnerEvent, LearnerSession, LessonCard};
pub use sync::{Hydration, PersistHandle, PersistOutcome, SessionSynchronizer};
