//! Scoped key-value storage service.
//! - One uniform async interface over several storage tiers (`local`, `cluster`, `ha`).
//! - Backends are pluggable through [`storage::backend::KvBackend`].
//! - Backend failures surface as [`errors::StorageError`], never retried here.

pub mod errors;
pub mod metrics;
pub mod storage;

pub use errors::{StorageError, StorageResult};
pub use storage::{
    scope::{Namespace, StorageScope, StorageServer},
    service::StorageService,
};
