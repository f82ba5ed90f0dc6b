//! Workload identity federation.
//!
//! This module provides:
//! - [`ProviderVariant`] - Which federation anchor (cluster or fleet) to use
//! - [`IdentityProviderFactory`] - Creates a provider for one resolution
//! - [`IdentityProvider`] - Exchanges a Kubernetes identity for a token source
//! - [`ProviderHandle`] - Owns a provider and closes it when dropped
//! - [`GcpIdentityProviderFactory`] - STS and IAM Credentials backed implementation
//!
//! A provider lives for exactly one token source construction. The handle
//! closes it on every exit path, including errors and cancellation.

use async_trait::async_trait;
use thiserror::Error;

use crate::kube::{KubeClient, StoreError};
use crate::model::NamespacedName;
use crate::token::{SharedTokenSource, TokenError};

mod gcp;

pub use gcp::{
    GCP_SERVICE_ACCOUNT_ANNOTATION, GcpIdentityProvider, GcpIdentityProviderFactory,
};

/// The identity the Kubernetes service account token is federated through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderVariant {
    /// Tokens issued by a single GKE cluster.
    ClusterIdentity {
        cluster_name: String,
        cluster_location: String,
    },

    /// Tokens issued by a cluster registered to a fleet membership.
    FleetIdentity { membership_name: String },
}

impl std::fmt::Display for ProviderVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClusterIdentity {
                cluster_name,
                cluster_location,
            } => write!(f, "cluster {}/{}", cluster_location, cluster_name),
            Self::FleetIdentity { membership_name } => {
                write!(f, "fleet membership {}", membership_name)
            }
        }
    }
}

/// Error type for federation backend operations.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Reading from the cluster failed.
    #[error("cluster request failed: {0}")]
    Kube(#[from] StoreError),

    /// A token endpoint call failed.
    #[error("{endpoint} exchange failed: {source}")]
    Token {
        endpoint: &'static str,
        #[source]
        source: TokenError,
    },

    /// The provider could not be built from its inputs.
    #[error("invalid workload identity configuration: {message}")]
    InvalidConfig { message: String },

    /// Building the HTTP client failed.
    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The provider was used after being closed.
    #[error("identity provider is closed")]
    Closed,
}

/// A connection to the federation backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build a token source for `service_account`, requesting its
    /// Kubernetes token with `audiences` in addition to the provider's own.
    async fn token_source(
        &self,
        kube: &dyn KubeClient,
        service_account: &NamespacedName,
        audiences: &[String],
    ) -> Result<SharedTokenSource, ExchangeError>;

    /// Release backend resources. Called exactly once, by [`ProviderHandle`].
    fn close(&mut self);
}

/// Creates identity providers.
#[async_trait]
pub trait IdentityProviderFactory: Send + Sync {
    /// Create a provider for `project_id` anchored at `variant`.
    async fn new_provider(
        &self,
        project_id: &str,
        variant: &ProviderVariant,
    ) -> Result<ProviderHandle, ExchangeError>;
}

/// Owns an identity provider and closes it on drop.
pub struct ProviderHandle {
    provider: Box<dyn IdentityProvider>,
}

impl ProviderHandle {
    /// Take ownership of a provider.
    pub fn new(provider: Box<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// See [`IdentityProvider::token_source`].
    pub async fn token_source(
        &self,
        kube: &dyn KubeClient,
        service_account: &NamespacedName,
        audiences: &[String],
    ) -> Result<SharedTokenSource, ExchangeError> {
        self.provider
            .token_source(kube, service_account, audiences)
            .await
    }
}

impl Drop for ProviderHandle {
    fn drop(&mut self) {
        self.provider.close();
        tracing::trace!("released workload identity provider");
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn token_source(
            &self,
            _kube: &dyn KubeClient,
            _service_account: &NamespacedName,
            _audiences: &[String],
        ) -> Result<SharedTokenSource, ExchangeError> {
            Err(ExchangeError::Closed)
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_handle_closes_once_on_drop() {
        let closed = Arc::new(AtomicUsize::new(0));
        let handle = ProviderHandle::new(Box::new(CountingProvider {
            closed: closed.clone(),
        }));

        assert_eq!(closed.load(Ordering::SeqCst), 0);
        drop(handle);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_variant_display() {
        let cluster = ProviderVariant::ClusterIdentity {
            cluster_name: "prod".to_string(),
            cluster_location: "europe-west4".to_string(),
        };
        assert_eq!(cluster.to_string(), "cluster europe-west4/prod");

        let fleet = ProviderVariant::FleetIdentity {
            membership_name: "m1".to_string(),
        };
        assert_eq!(fleet.to_string(), "fleet membership m1");
    }
}
