//! Storage abstractions for the service layer
//!
//! [`service::StorageService`] routes each call to the backend registered for
//! its `(server, scope)` namespace. Backends:
//! - [`memory`]: process-local map (`local`)
//! - [`cluster`]: coordinator task shared by all workers (`cluster`)
//! - [`replicated`] over [`file`] replicas (`ha`)
//! - [`remote`]: external storage service over HTTP (`zss`)

pub mod backend;
pub mod cluster;
pub mod file;
pub mod json_map_store;
pub mod memory;
pub mod remote;
pub mod replicated;
pub mod scope;
pub mod service;
