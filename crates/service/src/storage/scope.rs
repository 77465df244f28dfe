use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::StorageError;

/// Where a key-value pair lives and what durability it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageScope {
    /// Single process, not shared.
    Local,
    /// Shared by the cooperating workers of one deployment.
    Cluster,
    /// Replicated, survives loss of a replica.
    Ha,
}

impl StorageScope {
    pub const ALL: [StorageScope; 3] = [StorageScope::Local, StorageScope::Cluster, StorageScope::Ha];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageScope::Local => "local",
            StorageScope::Cluster => "cluster",
            StorageScope::Ha => "ha",
        }
    }
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageScope {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(StorageScope::Local),
            "cluster" => Ok(StorageScope::Cluster),
            "ha" => Ok(StorageScope::Ha),
            other => Err(StorageError::InvalidScope(other.to_string())),
        }
    }
}

/// Which service instance owns the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StorageServer {
    #[default]
    #[serde(rename = "app-server")]
    AppServer,
    #[serde(rename = "zss")]
    Zss,
}

impl StorageServer {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageServer::AppServer => "app-server",
            StorageServer::Zss => "zss",
        }
    }
}

impl fmt::Display for StorageServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageServer {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app-server" => Ok(StorageServer::AppServer),
            "zss" => Ok(StorageServer::Zss),
            other => Err(StorageError::InvalidServer(other.to_string())),
        }
    }
}

/// One independent key-value collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub server: StorageServer,
    pub scope: StorageScope,
}

impl Namespace {
    pub fn new(server: StorageServer, scope: StorageScope) -> Self {
        Self { server, scope }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.scope)
    }
}
