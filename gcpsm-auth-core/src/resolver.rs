//! Token source resolution.
//!
//! [`TokenSourceResolver::resolve`] picks exactly one authentication
//! strategy, in this order:
//!
//! 1. A service account key referenced by the spec's `secretRef`
//! 2. Platform default credentials, when the spec has no workload identity
//! 3. Workload identity federation through the cluster or fleet provider
//!
//! # Example
//!
//! ```rust,ignore
//! use gcpsm_auth_core::{
//!     AuthSpec, ResolveContext, ResolverConfig, StoreScope, TokenSourceResolver,
//! };
//!
//! async fn token_source(
//!     kube: &dyn gcpsm_auth_core::KubeClient,
//!     auth: &AuthSpec,
//! ) -> Result<gcpsm_auth_core::SharedTokenSource, gcpsm_auth_core::AuthError> {
//!     let resolver = TokenSourceResolver::new(&ResolverConfig::from_env())?;
//!     let ctx = ResolveContext::new();
//!     resolver
//!         .resolve(&ctx, auth, "my-project", StoreScope::Namespaced, "team-a", kube)
//!         .await
//! }
//! ```

use std::sync::Arc;
use tracing::debug;

use crate::ambient::{AmbientCredentials, DefaultCredentials};
use crate::config::ResolverConfig;
use crate::context::ResolveContext;
use crate::credentials::{CredentialParser, JsonCredentialParser};
use crate::error::AuthError;
use crate::extractor::resolve_static_credential;
use crate::kube::KubeClient;
use crate::model::{AuthSpec, CLOUD_PLATFORM_ROLE, StoreScope};
use crate::token::SharedTokenSource;
use crate::workload_identity::{GcpIdentityProviderFactory, IdentityProviderFactory};

/// Resolves an [`AuthSpec`] into a token source.
///
/// Holds no per-call state; one resolver can serve concurrent resolutions.
#[derive(Clone)]
pub struct TokenSourceResolver {
    parser: Arc<dyn CredentialParser>,
    ambient: Arc<dyn AmbientCredentials>,
    identity: Arc<dyn IdentityProviderFactory>,
}

impl TokenSourceResolver {
    /// Create a resolver backed by the Google endpoints in `config`.
    pub fn new(config: &ResolverConfig) -> Result<Self, AuthError> {
        config.validate()?;
        let http = config.http_client()?;

        Ok(Self::with_collaborators(
            Arc::new(JsonCredentialParser::new(http.clone())),
            Arc::new(DefaultCredentials::new(config, http)),
            Arc::new(GcpIdentityProviderFactory::new(config)),
        ))
    }

    /// Create a resolver from explicit collaborators.
    pub fn with_collaborators(
        parser: Arc<dyn CredentialParser>,
        ambient: Arc<dyn AmbientCredentials>,
        identity: Arc<dyn IdentityProviderFactory>,
    ) -> Self {
        Self {
            parser,
            ambient,
            identity,
        }
    }

    /// Produce a token source for a store.
    ///
    /// `namespace` is the namespace the store resolves for. Reference
    /// namespace overrides are honored only when `scope` is
    /// [`StoreScope::Cluster`]. Every blocking step runs under `ctx`.
    pub async fn resolve(
        &self,
        ctx: &ResolveContext,
        auth: &AuthSpec,
        project_id: &str,
        scope: StoreScope,
        namespace: &str,
        kube: &dyn KubeClient,
    ) -> Result<SharedTokenSource, AuthError> {
        if let Some(payload) =
            resolve_static_credential(ctx, auth, scope, namespace, kube).await?
        {
            debug!(
                "using service account key from secret for {} in {}",
                scope, namespace
            );
            return self
                .parser
                .parse_service_account_json(payload.expose().as_bytes(), CLOUD_PLATFORM_ROLE)
                .map_err(|source| AuthError::CredentialFormat { source });
        }

        let Some(workload_identity) = auth.workload_identity() else {
            debug!(
                "no explicit credentials for {} in {}, using default credentials",
                scope, namespace
            );
            return ctx
                .run(self.ambient.default_credentials(CLOUD_PLATFORM_ROLE))
                .await;
        };

        let service_account = workload_identity.service_account_key(scope, namespace);
        let variant = workload_identity.provider_variant();
        debug!(
            "using workload identity for service account {} via {}",
            service_account, variant
        );

        let provider = ctx
            .run(async {
                self.identity
                    .new_provider(project_id, &variant)
                    .await
                    .map_err(|source| AuthError::ProviderInit { source })
            })
            .await?;

        ctx.run(provider.token_source(
            kube,
            &service_account,
            &workload_identity.service_account_ref.audiences,
        ))
        .await
    }
}

impl std::fmt::Debug for TokenSourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSourceResolver").finish_non_exhaustive()
    }
}
