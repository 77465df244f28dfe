//! Shared building blocks for the storage sample workspace.

pub mod types;
pub mod utils;
pub mod env;
