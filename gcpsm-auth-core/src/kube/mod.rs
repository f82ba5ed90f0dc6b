//! Cluster access used during resolution.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`KubeClient`] - The slice of the Kubernetes API this crate consumes
//! - [`read_secret_key`] - Scoped read of one key of a secret
//! - [`MemoryKubeClient`] - In-memory implementation for testing
//!
//! # Scoping
//!
//! Reads go through [`StoreScope::namespace_for`], so a namespaced store can
//! never reach outside the namespace it resolves for, whatever namespace its
//! references name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::{NamespacedName, SecretKeySelector, StoreScope};

mod memory;

pub use memory::{MemoryKubeClient, TokenRequest};

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Data of a Kubernetes secret, by key.
pub type SecretData = BTreeMap<String, Secret>;

/// The parts of a Kubernetes service account this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    /// Service account name.
    pub name: String,

    /// Service account namespace.
    pub namespace: String,

    /// Object annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ServiceAccount {
    /// Create a service account without annotations.
    pub fn new(key: &NamespacedName) -> Self {
        Self {
            name: key.name.clone(),
            namespace: key.namespace.clone(),
            annotations: BTreeMap::new(),
        }
    }

    /// Add an annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// The object key of this service account.
    pub fn key(&self) -> NamespacedName {
        NamespacedName::new(&self.namespace, &self.name)
    }
}

/// Error type for cluster reads.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The secret object does not exist.
    #[error("secret not found: {secret}")]
    SecretNotFound { secret: NamespacedName },

    /// The secret exists but has no such key.
    #[error("key {key:?} not found in secret {secret}")]
    KeyNotFound { secret: NamespacedName, key: String },

    /// The service account does not exist.
    #[error("service account not found: {service_account}")]
    ServiceAccountNotFound { service_account: NamespacedName },

    /// The API server refused the request.
    #[error("access denied to {resource}")]
    AccessDenied { resource: String },

    /// The cluster backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },
}

/// The Kubernetes API surface consumed during resolution.
///
/// Implementations must be safe to share between concurrent resolutions.
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch the data of a secret.
    async fn get_secret(&self, key: &NamespacedName) -> Result<SecretData, StoreError>;

    /// Fetch a service account.
    async fn get_service_account(&self, key: &NamespacedName)
    -> Result<ServiceAccount, StoreError>;

    /// Issue a token for a service account via the TokenRequest API.
    async fn create_service_account_token(
        &self,
        key: &NamespacedName,
        audiences: &[String],
    ) -> Result<Secret, StoreError>;
}

/// Read one key of a secret on behalf of a store.
///
/// The selector's namespace override applies only to cluster-scoped stores.
pub async fn read_secret_key(
    kube: &dyn KubeClient,
    scope: StoreScope,
    namespace: &str,
    selector: &SecretKeySelector,
) -> Result<Secret, StoreError> {
    let secret = NamespacedName::new(
        scope.namespace_for(namespace, selector.namespace.as_deref()),
        selector.name.clone(),
    );

    tracing::trace!("reading key {:?} of secret {} for {}", selector.key, secret, scope);

    let mut data = kube.get_secret(&secret).await?;
    data.remove(&selector.key).ok_or_else(|| StoreError::KeyNotFound {
        secret,
        key: selector.key.clone(),
    })
}
