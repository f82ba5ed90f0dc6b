//! GKE workload identity via the Security Token Service.
//!
//! The exchange runs in three steps:
//!
//! 1. Request a Kubernetes token for the service account, audience-bound to
//!    the project's identity pool.
//! 2. Trade it at STS for a federated access token.
//! 3. If the service account is annotated with a Google service account,
//!    impersonate that account through IAM Credentials.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{
    ExchangeError, IdentityProvider, IdentityProviderFactory, ProviderHandle, ProviderVariant,
};
use crate::config::ResolverConfig;
use crate::kube::{KubeClient, Secret};
use crate::model::{CLOUD_PLATFORM_ROLE, NamespacedName};
use crate::token::{
    SharedTokenSource, StaticTokenSource, Token, TokenError, read_json_response,
    read_token_response,
};

/// Service account annotation naming the Google service account to impersonate.
pub const GCP_SERVICE_ACCOUNT_ANNOTATION: &str = "iam.gke.io/gcp-service-account";

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const JWT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";

/// Creates [`GcpIdentityProvider`]s.
#[derive(Debug, Clone)]
pub struct GcpIdentityProviderFactory {
    sts_endpoint: String,
    iam_credentials_endpoint: String,
    http_timeout: Duration,
}

impl GcpIdentityProviderFactory {
    /// Create a factory using the endpoints in `config`.
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            sts_endpoint: config.sts_endpoint.clone(),
            iam_credentials_endpoint: config
                .iam_credentials_endpoint
                .trim_end_matches('/')
                .to_string(),
            http_timeout: config.http_timeout(),
        }
    }
}

fn require(value: &str, what: &str) -> Result<(), ExchangeError> {
    if value.is_empty() {
        return Err(ExchangeError::InvalidConfig {
            message: format!("{} is required", what),
        });
    }
    Ok(())
}

#[async_trait]
impl IdentityProviderFactory for GcpIdentityProviderFactory {
    async fn new_provider(
        &self,
        project_id: &str,
        variant: &ProviderVariant,
    ) -> Result<ProviderHandle, ExchangeError> {
        require(project_id, "project id")?;

        let identity_provider = match variant {
            ProviderVariant::ClusterIdentity {
                cluster_name,
                cluster_location,
            } => {
                require(cluster_name, "cluster name")?;
                require(cluster_location, "cluster location")?;
                format!(
                    "https://container.googleapis.com/v1/projects/{}/locations/{}/clusters/{}",
                    project_id, cluster_location, cluster_name
                )
            }
            ProviderVariant::FleetIdentity { membership_name } => {
                require(membership_name, "cluster membership name")?;
                format!(
                    "https://gkehub.googleapis.com/projects/{}/locations/global/memberships/{}",
                    project_id, membership_name
                )
            }
        };

        let http = reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .map_err(ExchangeError::HttpClient)?;

        debug!("initialized workload identity provider for {}", variant);

        Ok(ProviderHandle::new(Box::new(GcpIdentityProvider {
            http: Some(http),
            identity_pool: format!("{}.svc.id.goog", project_id),
            identity_provider,
            sts_endpoint: self.sts_endpoint.clone(),
            iam_credentials_endpoint: self.iam_credentials_endpoint.clone(),
        })))
    }
}

/// Federates Kubernetes service accounts into Google access tokens.
#[derive(Debug)]
pub struct GcpIdentityProvider {
    http: Option<reqwest::Client>,
    identity_pool: String,
    identity_provider: String,
    sts_endpoint: String,
    iam_credentials_endpoint: String,
}

#[derive(Serialize)]
struct GenerateAccessTokenRequest<'a> {
    scope: [&'a str; 1],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    expire_time: Option<DateTime<Utc>>,
}

impl GcpIdentityProvider {
    async fn exchange(
        &self,
        http: &reqwest::Client,
        subject_token: &Secret,
    ) -> Result<Token, TokenError> {
        let audience = format!(
            "identitynamespace:{}:{}",
            self.identity_pool, self.identity_provider
        );

        let response = http
            .post(&self.sts_endpoint)
            .form(&[
                ("grant_type", TOKEN_EXCHANGE_GRANT),
                ("audience", audience.as_str()),
                ("scope", CLOUD_PLATFORM_ROLE),
                ("requested_token_type", ACCESS_TOKEN_TYPE),
                ("subject_token", subject_token.expose()),
                ("subject_token_type", JWT_TOKEN_TYPE),
            ])
            .send()
            .await?;

        read_token_response(response).await
    }

    async fn impersonate(
        &self,
        http: &reqwest::Client,
        federated: &Token,
        gcp_service_account: &str,
    ) -> Result<Token, TokenError> {
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:generateAccessToken",
            self.iam_credentials_endpoint, gcp_service_account
        );

        let response = http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, federated.authorization_header())
            .json(&GenerateAccessTokenRequest {
                scope: [CLOUD_PLATFORM_ROLE],
            })
            .send()
            .await?;

        let body: GenerateAccessTokenResponse = read_json_response(response).await?;
        if body.access_token.is_empty() {
            return Err(TokenError::MalformedResponse {
                message: "empty accessToken".to_string(),
            });
        }

        let mut token = Token::new(body.access_token);
        if let Some(expire_time) = body.expire_time {
            token = token.with_expiry(expire_time);
        }
        Ok(token)
    }
}

#[async_trait]
impl IdentityProvider for GcpIdentityProvider {
    async fn token_source(
        &self,
        kube: &dyn KubeClient,
        service_account: &NamespacedName,
        audiences: &[String],
    ) -> Result<SharedTokenSource, ExchangeError> {
        let http = self.http.as_ref().ok_or(ExchangeError::Closed)?;

        let account = kube.get_service_account(service_account).await?;
        let gcp_service_account = account
            .annotations
            .get(GCP_SERVICE_ACCOUNT_ANNOTATION)
            .filter(|value| !value.is_empty());

        let mut token_audiences = Vec::with_capacity(audiences.len() + 1);
        token_audiences.push(self.identity_pool.clone());
        token_audiences.extend(audiences.iter().cloned());

        let subject_token = kube
            .create_service_account_token(service_account, &token_audiences)
            .await?;

        let federated = self
            .exchange(http, &subject_token)
            .await
            .map_err(|source| ExchangeError::Token {
                endpoint: "sts",
                source,
            })?;

        let Some(gcp_service_account) = gcp_service_account else {
            debug!("using federated token for {}", service_account);
            return Ok(Arc::new(StaticTokenSource::new(federated)));
        };

        debug!(
            "impersonating {} for {}",
            gcp_service_account, service_account
        );
        let token = self
            .impersonate(http, &federated, gcp_service_account)
            .await
            .map_err(|source| ExchangeError::Token {
                endpoint: "iam credentials",
                source,
            })?;

        Ok(Arc::new(StaticTokenSource::new(token)))
    }

    fn close(&mut self) {
        self.http = None;
    }
}
