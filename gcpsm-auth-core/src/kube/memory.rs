//! In-memory cluster implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{KubeClient, Secret, SecretData, ServiceAccount, StoreError};
use crate::model::NamespacedName;

/// A service account token request recorded by [`MemoryKubeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// The service account the token was issued for.
    pub service_account: NamespacedName,

    /// Audiences requested, in order.
    pub audiences: Vec<String>,
}

/// In-memory cluster for testing and local development.
///
/// Issued service account tokens are deterministic:
/// `memory-token:{namespace}/{name}`.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
#[derive(Default)]
pub struct MemoryKubeClient {
    secrets: RwLock<HashMap<NamespacedName, SecretData>>,
    service_accounts: RwLock<HashMap<NamespacedName, ServiceAccount>>,
    token_requests: RwLock<Vec<TokenRequest>>,
    secret_reads: AtomicUsize,
}

impl MemoryKubeClient {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a secret.
    pub fn insert_secret<I, K, V>(&self, key: NamespacedName, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = data
            .into_iter()
            .map(|(k, v)| (k.into(), Secret::new(v)))
            .collect();
        self.secrets.write().insert(key, data);
    }

    /// Create or replace a service account.
    pub fn insert_service_account(&self, service_account: ServiceAccount) {
        self.service_accounts
            .write()
            .insert(service_account.key(), service_account);
    }

    /// Token requests served so far, oldest first.
    pub fn token_requests(&self) -> Vec<TokenRequest> {
        self.token_requests.read().clone()
    }

    /// Number of secret reads served so far.
    pub fn secret_reads(&self) -> usize {
        self.secret_reads.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryKubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKubeClient")
            .field("secrets_count", &self.secrets.read().len())
            .field("service_accounts_count", &self.service_accounts.read().len())
            .finish()
    }
}

#[async_trait]
impl KubeClient for MemoryKubeClient {
    async fn get_secret(&self, key: &NamespacedName) -> Result<SecretData, StoreError> {
        self.secret_reads.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::SecretNotFound {
                secret: key.clone(),
            })
    }

    async fn get_service_account(
        &self,
        key: &NamespacedName,
    ) -> Result<ServiceAccount, StoreError> {
        self.service_accounts
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::ServiceAccountNotFound {
                service_account: key.clone(),
            })
    }

    async fn create_service_account_token(
        &self,
        key: &NamespacedName,
        audiences: &[String],
    ) -> Result<Secret, StoreError> {
        if !self.service_accounts.read().contains_key(key) {
            return Err(StoreError::ServiceAccountNotFound {
                service_account: key.clone(),
            });
        }

        self.token_requests.write().push(TokenRequest {
            service_account: key.clone(),
            audiences: audiences.to_vec(),
        });
        Ok(Secret::new(format!("memory-token:{}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_secret_roundtrip() {
        let client = MemoryKubeClient::new();
        let key = NamespacedName::new("ns1", "creds");
        client.insert_secret(key.clone(), [("a", "1"), ("b", "2")]);

        let data = client.get_secret(&key).await.unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data["b"].expose(), "2");
        assert_eq!(client.secret_reads(), 1);
    }

    #[tokio::test]
    async fn test_token_request_recorded() {
        let client = MemoryKubeClient::new();
        let key = NamespacedName::new("ns1", "sa1");
        client.insert_service_account(ServiceAccount::new(&key));

        let token = client
            .create_service_account_token(&key, &["aud".to_string()])
            .await
            .unwrap();

        assert_eq!(token.expose(), "memory-token:ns1/sa1");
        assert_eq!(
            client.token_requests(),
            vec![TokenRequest {
                service_account: key,
                audiences: vec!["aud".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_token_for_unknown_service_account() {
        let client = MemoryKubeClient::new();
        let key = NamespacedName::new("ns1", "ghost");

        let result = client.create_service_account_token(&key, &[]).await;
        assert!(matches!(result, Err(StoreError::ServiceAccountNotFound { .. })));
        assert!(client.token_requests().is_empty());
    }
}
