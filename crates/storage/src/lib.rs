#![forbid(unsafe_code)]

pub mod repository;
pub mod rest;
pub mod sqlite;

pub use repository::{
    AccountRecord, AccountRepository, CompletionRecord, CompletionRepository, InMemoryRepository,
    ProfileRecord, ProfileRepository, ProfileUpdate, Storage, StorageError,
};
