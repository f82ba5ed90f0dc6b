//! # gcpsm-auth core
//!
//! Token source resolution for GCP Secret Manager secret stores.
//!
//! This crate provides:
//! - Domain types for a store's authentication spec and scope
//! - [`TokenSourceResolver`], which turns a spec into a token source by way of
//!   a static service account key, workload identity federation, or the
//!   platform's default credentials
//! - Traits for every external collaborator (cluster, credential parser,
//!   default credentials, federation backend) with production implementations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gcpsm_auth_core::{
//!     AuthSpec, MemoryKubeClient, ResolveContext, ResolverConfig, StoreScope,
//!     TokenSourceResolver,
//! };
//!
//! async fn access_token(auth: &AuthSpec) -> Result<String, Box<dyn std::error::Error>> {
//!     let kube = MemoryKubeClient::new();
//!     let resolver = TokenSourceResolver::new(&ResolverConfig::from_env())?;
//!     let source = resolver
//!         .resolve(&ResolveContext::new(), auth, "my-project", StoreScope::Namespaced, "default", &kube)
//!         .await?;
//!     Ok(source.token().await?.access_token.expose().to_string())
//! }
//! ```

pub mod ambient;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod extractor;
pub mod kube;
pub mod model;
pub mod resolver;
pub mod token;
pub mod workload_identity;

// Re-export commonly used types at crate root
pub use model::{
    AuthSpec,
    AuthDocument,
    SecretRef,
    SecretKeySelector,
    ServiceAccountSelector,
    WorkloadIdentityConfig,
    StoreScope,
    NamespacedName,
    CLOUD_PLATFORM_ROLE,
};

pub use kube::{
    KubeClient,
    MemoryKubeClient,
    Secret,
    ServiceAccount,
    StoreError,
    read_secret_key,
};

pub use token::{
    Token,
    TokenSource,
    SharedTokenSource,
    StaticTokenSource,
    TokenError,
};

pub use credentials::{
    CredentialError,
    CredentialParser,
    JsonCredentialParser,
};

pub use ambient::{
    AmbientCredentials,
    AmbientError,
    DefaultCredentials,
};

pub use workload_identity::{
    ExchangeError,
    GcpIdentityProviderFactory,
    IdentityProvider,
    IdentityProviderFactory,
    ProviderHandle,
    ProviderVariant,
};

pub use config::ResolverConfig;
pub use context::ResolveContext;
pub use error::AuthError;
pub use extractor::resolve_static_credential;
pub use resolver::TokenSourceResolver;
