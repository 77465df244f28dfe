use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::{StorageError, StorageResult};

/// Contents of one namespace.
pub type Collection = HashMap<String, String>;

/// Trait abstraction for a store backing one namespace.
/// Implementations can be in-process, coordinator-backed, file-backed, replicated or remote.
///
/// `get` reports a missing key as `Ok(None)`; turning that into
/// [`StorageError::NotFound`] is the service's job.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Human-readable identity used in logs and error messages.
    fn describe(&self) -> String;
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;
    async fn get_all(&self) -> StorageResult<Collection>;
    async fn set(&self, key: &str, value: String) -> StorageResult<()>;
    /// Replace the whole collection.
    async fn set_all(&self, entries: Collection) -> StorageResult<()>;
    /// Remove a key. Missing keys are not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
    async fn delete_all(&self) -> StorageResult<()>;
}

/// Limits a backend applies before accepting a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValuePolicy {
    pub max_value_bytes: usize,
}

impl Default for ValuePolicy {
    fn default() -> Self {
        Self { max_value_bytes: 64 * 1024 }
    }
}

impl ValuePolicy {
    pub fn new(max_value_bytes: usize) -> Self {
        Self { max_value_bytes }
    }

    pub fn check(&self, key: &str, value: &str) -> StorageResult<()> {
        if value.len() > self.max_value_bytes {
            return Err(StorageError::InvalidValue(format!(
                "value for '{}' is {} bytes, limit is {}",
                key,
                value.len(),
                self.max_value_bytes
            )));
        }
        Ok(())
    }

    pub fn check_all(&self, entries: &Collection) -> StorageResult<()> {
        entries.iter().try_for_each(|(k, v)| self.check(k, v))
    }
}

/// Values arrive as arbitrary JSON but are stored as text: strings verbatim,
/// `null` as absent, anything else as its JSON serialization.
pub fn json_to_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_become_text() {
        assert_eq!(json_to_text(serde_json::json!("plain")), Some("plain".to_string()));
        assert_eq!(json_to_text(serde_json::json!(42)), Some("42".to_string()));
        assert_eq!(json_to_text(serde_json::json!({"a": 1})), Some("{\"a\":1}".to_string()));
        assert_eq!(json_to_text(serde_json::Value::Null), None);
    }

    #[test]
    fn value_policy_enforces_limit() {
        let policy = ValuePolicy::new(4);
        assert!(policy.check("k", "abcd").is_ok());
        let err = policy.check("k", "abcde").unwrap_err();
        assert!(matches!(err, StorageError::InvalidValue(_)));

        let mut entries = Collection::new();
        entries.insert("a".into(), "ok".into());
        entries.insert("b".into(), "too long".into());
        assert!(policy.check_all(&entries).is_err());
    }
}
