//! Domain model types for secret store authentication.
//!
//! This module defines the declarative inputs to token source resolution:
//! - [`AuthSpec`] - Which authentication strategy a store uses
//! - [`SecretRef`] / [`SecretKeySelector`] - Static service account key material
//! - [`WorkloadIdentityConfig`] / [`ServiceAccountSelector`] - Federated workload identity
//! - [`StoreScope`] - The authorization boundary of the calling store
//! - [`NamespacedName`] - Key for a namespaced Kubernetes object

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::workload_identity::ProviderVariant;

/// OAuth scope requested for every token this crate produces.
pub const CLOUD_PLATFORM_ROLE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Resource kind of a cluster-scoped secret store.
pub const CLUSTER_STORE_KIND: &str = "ClusterSecretStore";

/// Resource kind of a namespaced secret store.
pub const NAMESPACED_STORE_KIND: &str = "SecretStore";

/// Authorization boundary of the store requesting credentials.
///
/// Only a [`StoreScope::Cluster`] store may reference secrets or service
/// accounts outside the namespace it is resolving for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreScope {
    /// A store confined to its own namespace.
    #[default]
    Namespaced,

    /// A cluster-wide store.
    Cluster,
}

impl StoreScope {
    /// Derive the scope from a store resource kind.
    ///
    /// Anything other than `ClusterSecretStore` is treated as namespaced.
    pub fn from_kind(kind: &str) -> Self {
        if kind == CLUSTER_STORE_KIND {
            Self::Cluster
        } else {
            Self::Namespaced
        }
    }

    /// The store resource kind for this scope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Namespaced => NAMESPACED_STORE_KIND,
            Self::Cluster => CLUSTER_STORE_KIND,
        }
    }

    /// Check if this is a cluster-scoped store.
    pub fn is_cluster(&self) -> bool {
        matches!(self, Self::Cluster)
    }

    /// Pick the namespace a reference resolves in.
    ///
    /// The explicit override is honored for cluster stores only; a
    /// namespaced store always stays in `default_namespace`.
    pub fn namespace_for(&self, default_namespace: &str, explicit: Option<&str>) -> String {
        match explicit {
            Some(namespace) if self.is_cluster() => namespace.to_string(),
            _ => default_namespace.to_string(),
        }
    }
}

impl fmt::Display for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Key for a namespaced Kubernetes object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    /// Namespace the object lives in.
    pub namespace: String,

    /// Object name.
    pub name: String,
}

impl NamespacedName {
    /// Create a new object key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference to a single key of a Kubernetes secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Name of the secret object.
    pub name: String,

    /// Key within the secret's data.
    #[serde(default)]
    pub key: String,

    /// Namespace override, honored for cluster-scoped stores only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretKeySelector {
    /// Create a selector for `key` in secret `name`.
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            namespace: None,
        }
    }

    /// Set the namespace override.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Static credentials: a JSON service account key stored in a secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Where the service account key JSON lives.
    #[serde(rename = "secretAccessKeySecretRef")]
    pub secret_access_key: SecretKeySelector,
}

impl SecretRef {
    /// Create a secret reference from a key selector.
    pub fn new(secret_access_key: SecretKeySelector) -> Self {
        Self { secret_access_key }
    }
}

/// Reference to the Kubernetes service account used for federation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSelector {
    /// Service account name.
    pub name: String,

    /// Namespace override, honored for cluster-scoped stores only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Extra audiences for the issued service account token, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

impl ServiceAccountSelector {
    /// Create a selector for service account `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            audiences: Vec::new(),
        }
    }

    /// Set the namespace override.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the extra token audiences.
    pub fn with_audiences(mut self, audiences: Vec<String>) -> Self {
        self.audiences = audiences;
        self
    }

    /// Compute the key of the referenced service account for a store.
    pub fn key_for(&self, scope: StoreScope, namespace: &str) -> NamespacedName {
        NamespacedName::new(
            scope.namespace_for(namespace, self.namespace.as_deref()),
            self.name.clone(),
        )
    }
}

/// Workload identity federation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadIdentityConfig {
    /// The Kubernetes service account whose identity is exchanged.
    pub service_account_ref: ServiceAccountSelector,

    /// Name of the GKE cluster issuing service account tokens.
    #[serde(default)]
    pub cluster_name: String,

    /// Location (region or zone) of the GKE cluster.
    #[serde(default)]
    pub cluster_location: String,

    /// Fleet membership name; when non-empty it replaces the cluster as
    /// the federation anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_membership_name: Option<String>,
}

impl WorkloadIdentityConfig {
    /// Cluster-anchored workload identity.
    pub fn cluster(
        service_account_ref: ServiceAccountSelector,
        cluster_name: impl Into<String>,
        cluster_location: impl Into<String>,
    ) -> Self {
        Self {
            service_account_ref,
            cluster_name: cluster_name.into(),
            cluster_location: cluster_location.into(),
            cluster_membership_name: None,
        }
    }

    /// Fleet-anchored workload identity.
    pub fn fleet(
        service_account_ref: ServiceAccountSelector,
        membership_name: impl Into<String>,
    ) -> Self {
        Self {
            service_account_ref,
            cluster_name: String::new(),
            cluster_location: String::new(),
            cluster_membership_name: Some(membership_name.into()),
        }
    }

    /// Select the identity provider variant for this configuration.
    pub fn provider_variant(&self) -> ProviderVariant {
        match self.cluster_membership_name.as_deref() {
            Some(membership) if !membership.is_empty() => ProviderVariant::FleetIdentity {
                membership_name: membership.to_string(),
            },
            _ => ProviderVariant::ClusterIdentity {
                cluster_name: self.cluster_name.clone(),
                cluster_location: self.cluster_location.clone(),
            },
        }
    }

    /// Compute the key of the federated service account for a store.
    pub fn service_account_key(&self, scope: StoreScope, namespace: &str) -> NamespacedName {
        self.service_account_ref.key_for(scope, namespace)
    }
}

/// How a secret store authenticates to Secret Manager.
///
/// Deserializes from the store's `auth` document. When that document
/// populates both `secretRef` and `workloadIdentity`, the secret reference
/// wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AuthDocument", into = "AuthDocument")]
pub enum AuthSpec {
    /// Static service account key stored in a secret.
    SecretRef(SecretRef),

    /// Federated workload identity.
    WorkloadIdentity(WorkloadIdentityConfig),

    /// Nothing configured; use the platform's default credentials.
    #[default]
    Ambient,
}

impl AuthSpec {
    /// The static secret reference, if this spec uses one.
    pub fn secret_ref(&self) -> Option<&SecretRef> {
        match self {
            Self::SecretRef(secret_ref) => Some(secret_ref),
            _ => None,
        }
    }

    /// The workload identity configuration, if this spec uses one.
    pub fn workload_identity(&self) -> Option<&WorkloadIdentityConfig> {
        match self {
            Self::WorkloadIdentity(config) => Some(config),
            _ => None,
        }
    }
}

/// The `auth` block as written on a secret store resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_identity: Option<WorkloadIdentityConfig>,
}

impl From<AuthDocument> for AuthSpec {
    fn from(doc: AuthDocument) -> Self {
        match (doc.secret_ref, doc.workload_identity) {
            (Some(secret_ref), _) => Self::SecretRef(secret_ref),
            (None, Some(config)) => Self::WorkloadIdentity(config),
            (None, None) => Self::Ambient,
        }
    }
}

impl From<AuthSpec> for AuthDocument {
    fn from(spec: AuthSpec) -> Self {
        match spec {
            AuthSpec::SecretRef(secret_ref) => Self {
                secret_ref: Some(secret_ref),
                workload_identity: None,
            },
            AuthSpec::WorkloadIdentity(config) => Self {
                secret_ref: None,
                workload_identity: Some(config),
            },
            AuthSpec::Ambient => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_scope_from_kind() {
        assert_eq!(StoreScope::from_kind("ClusterSecretStore"), StoreScope::Cluster);
        assert_eq!(StoreScope::from_kind("SecretStore"), StoreScope::Namespaced);
        assert_eq!(StoreScope::from_kind(""), StoreScope::Namespaced);
        assert_eq!(StoreScope::from_kind("clustersecretstore"), StoreScope::Namespaced);
    }

    #[test]
    fn test_namespace_override_only_for_cluster_scope() {
        assert_eq!(StoreScope::Cluster.namespace_for("ns1", Some("other")), "other");
        assert_eq!(StoreScope::Cluster.namespace_for("ns1", None), "ns1");
        assert_eq!(StoreScope::Namespaced.namespace_for("ns1", Some("other")), "ns1");
    }

    #[test]
    fn test_service_account_key() {
        let selector = ServiceAccountSelector::new("sa1").in_namespace("platform");

        assert_eq!(
            selector.key_for(StoreScope::Namespaced, "ns1"),
            NamespacedName::new("ns1", "sa1")
        );
        assert_eq!(
            selector.key_for(StoreScope::Cluster, "ns1"),
            NamespacedName::new("platform", "sa1")
        );
    }

    #[test]
    fn test_provider_variant_selection() {
        let fleet = WorkloadIdentityConfig::fleet(ServiceAccountSelector::new("sa1"), "m1");
        assert_eq!(
            fleet.provider_variant(),
            ProviderVariant::FleetIdentity {
                membership_name: "m1".to_string()
            }
        );

        let mut cluster = WorkloadIdentityConfig::cluster(
            ServiceAccountSelector::new("sa1"),
            "prod",
            "europe-west1",
        );
        cluster.cluster_membership_name = Some(String::new());
        assert_eq!(
            cluster.provider_variant(),
            ProviderVariant::ClusterIdentity {
                cluster_name: "prod".to_string(),
                cluster_location: "europe-west1".to_string(),
            }
        );
    }

    #[test]
    fn test_auth_spec_from_document() {
        let spec: AuthSpec = serde_json::from_str(
            r#"{
                "workloadIdentity": {
                    "clusterName": "prod",
                    "clusterLocation": "us-central1",
                    "serviceAccountRef": {"name": "eso", "audiences": ["a", "b"]}
                }
            }"#,
        )
        .unwrap();

        let config = spec.workload_identity().unwrap();
        assert_eq!(config.cluster_name, "prod");
        assert_eq!(config.service_account_ref.audiences, vec!["a", "b"]);
        assert!(spec.secret_ref().is_none());
    }

    #[test]
    fn test_auth_spec_secret_ref_wins() {
        let spec: AuthSpec = serde_json::from_str(
            r#"{
                "secretRef": {"secretAccessKeySecretRef": {"name": "s1", "key": "k1"}},
                "workloadIdentity": {"serviceAccountRef": {"name": "sa1"}}
            }"#,
        )
        .unwrap();

        assert_eq!(
            spec,
            AuthSpec::SecretRef(SecretRef::new(SecretKeySelector::new("s1", "k1")))
        );
    }

    #[test]
    fn test_empty_auth_spec_is_ambient() {
        let spec: AuthSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec, AuthSpec::Ambient);
        assert_eq!(serde_json::to_string(&spec).unwrap(), "{}");
    }
}
