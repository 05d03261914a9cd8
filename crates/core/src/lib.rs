#![forbid(unsafe_code)]

pub mod catalog;
pub mod ledger;
pub mod model;
pub mod quiz;
pub mod time;

pub use catalog::{Catalog, CatalogError};
pub use ledger::ProgressLedger;
pub use quiz::{Advance, AnswerOutcome, QuestionProgress, QuizError, QuizMachine, QuizState};
pub use time::Clock;
