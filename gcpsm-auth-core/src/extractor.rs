//! Static credential extraction.

use crate::context::ResolveContext;
use crate::error::AuthError;
use crate::kube::{KubeClient, Secret, read_secret_key};
use crate::model::{AuthSpec, StoreScope};

/// Fetch the service account key a spec references, if it references one.
///
/// Returns `Ok(None)` when the spec has no secret reference. Otherwise
/// performs exactly one secret read, scoped to `namespace` and `scope`, and
/// returns its failure unchanged.
pub async fn resolve_static_credential(
    ctx: &ResolveContext,
    auth: &AuthSpec,
    scope: StoreScope,
    namespace: &str,
    kube: &dyn KubeClient,
) -> Result<Option<Secret>, AuthError> {
    let Some(secret_ref) = auth.secret_ref() else {
        return Ok(None);
    };

    let payload = ctx
        .run(read_secret_key(
            kube,
            scope,
            namespace,
            &secret_ref.secret_access_key,
        ))
        .await?;

    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::{MemoryKubeClient, StoreError};
    use crate::model::{
        NamespacedName, SecretKeySelector, SecretRef, ServiceAccountSelector,
        WorkloadIdentityConfig,
    };

    fn secret_spec(selector: SecretKeySelector) -> AuthSpec {
        AuthSpec::SecretRef(SecretRef::new(selector))
    }

    fn kube() -> MemoryKubeClient {
        let kube = MemoryKubeClient::new();
        kube.insert_secret(NamespacedName::new("ns1", "s1"), [("k1", "{\"payload\":1}")]);
        kube
    }

    #[tokio::test]
    async fn test_not_configured() {
        let kube = kube();
        let ctx = ResolveContext::new();

        for auth in [
            AuthSpec::Ambient,
            AuthSpec::WorkloadIdentity(WorkloadIdentityConfig::fleet(
                ServiceAccountSelector::new("sa1"),
                "m1",
            )),
        ] {
            let payload =
                resolve_static_credential(&ctx, &auth, StoreScope::Namespaced, "ns1", &kube)
                    .await
                    .unwrap();
            assert!(payload.is_none());
        }
        assert_eq!(kube.secret_reads(), 0);
    }

    #[tokio::test]
    async fn test_reads_payload_once() {
        let kube = kube();
        let auth = secret_spec(SecretKeySelector::new("s1", "k1"));

        let payload = resolve_static_credential(
            &ResolveContext::new(),
            &auth,
            StoreScope::Namespaced,
            "ns1",
            &kube,
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(payload.expose(), "{\"payload\":1}");
        assert_eq!(kube.secret_reads(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_propagates() {
        let kube = kube();
        let auth = secret_spec(SecretKeySelector::new("s1", "missing"));

        let result = resolve_static_credential(
            &ResolveContext::new(),
            &auth,
            StoreScope::Namespaced,
            "ns1",
            &kube,
        )
        .await;

        assert!(matches!(
            result,
            Err(AuthError::SecretRead(StoreError::KeyNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_namespaced_store_cannot_escape() {
        let kube = kube();
        let auth = secret_spec(SecretKeySelector::new("s1", "k1").in_namespace("ns1"));

        let result = resolve_static_credential(
            &ResolveContext::new(),
            &auth,
            StoreScope::Namespaced,
            "ns2",
            &kube,
        )
        .await;

        assert!(matches!(
            result,
            Err(AuthError::SecretRead(StoreError::SecretNotFound { ref secret }))
                if secret.namespace == "ns2"
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_read() {
        let kube = kube();
        let ctx = ResolveContext::new();
        ctx.cancellation().cancel();

        let result = resolve_static_credential(
            &ctx,
            &secret_spec(SecretKeySelector::new("s1", "k1")),
            StoreScope::Namespaced,
            "ns1",
            &kube,
        )
        .await;

        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert_eq!(kube.secret_reads(), 0);
    }
}
