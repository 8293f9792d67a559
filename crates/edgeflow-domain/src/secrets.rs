use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("secret '{name}' is missing required keys: {missing:?}")]
    MissingKeys { name: String, missing: Vec<String> },
}

/// Source of named secret data (credentials, certificate paths).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<HashMap<String, String>, SecretError>;
}

/// Secret provider backed by a process-local map, seeded from
/// configuration. Suitable for development and tests.
#[derive(Default)]
pub struct InMemorySecretProvider {
    secrets: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl InMemorySecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, data: HashMap<String, String>) {
        self.secrets
            .write()
            .expect("secret map lock poisoned")
            .insert(name.into(), data);
    }
}

#[async_trait]
impl SecretProvider for InMemorySecretProvider {
    async fn get_secret(&self, name: &str) -> Result<HashMap<String, String>, SecretError> {
        self.secrets
            .read()
            .expect("secret map lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_seeded_secret_data() {
        let provider = InMemorySecretProvider::new();
        provider.insert(
            "bus-credentials",
            HashMap::from([
                ("username".to_string(), "svc".to_string()),
                ("password".to_string(), "hunter2".to_string()),
            ]),
        );

        let data = provider.get_secret("bus-credentials").await.unwrap();
        assert_eq!(data.get("username").map(String::as_str), Some("svc"));
    }

    #[tokio::test]
    async fn missing_secret_is_an_error() {
        let provider = InMemorySecretProvider::new();
        let err = provider.get_secret("nope").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }
}
