//! Google credential files.
//!
//! This module provides:
//! - [`CredentialsFile`] - The JSON credential formats this crate accepts
//! - [`CredentialParser`] - Trait turning a service account key into a token source
//! - [`JsonCredentialParser`] - The production parser
//! - [`ServiceAccountTokenSource`] - JWT-bearer grant with a service account key
//! - [`RefreshTokenSource`] - Refresh-token grant for gcloud user credentials

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::kube::Secret;
use crate::token::{
    SharedTokenSource, Token, TokenError, TokenSource, expiry_after, read_token_response,
};

/// Token endpoint used when a credential file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Error type for credential parsing.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The document is not valid credential JSON.
    #[error("invalid credentials JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is valid but of the wrong `type`.
    #[error("'type' field is {found:?} (expected \"service_account\")")]
    UnsupportedType { found: String },

    /// A required field is empty.
    #[error("missing required field {field:?}")]
    MissingField { field: &'static str },

    /// The private key is not a usable RSA key.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(#[source] jsonwebtoken::errors::Error),

    /// A URL in the document is invalid.
    #[error("invalid {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// A Google credentials JSON document, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    /// A service account key.
    ServiceAccount(ServiceAccountKey),

    /// User credentials written by `gcloud auth application-default login`.
    AuthorizedUser(AuthorizedUserCredentials),
}

impl CredentialsFile {
    /// Parse a credentials document.
    pub fn from_json(json: &[u8]) -> Result<Self, CredentialError> {
        Ok(serde_json::from_slice(json)?)
    }

    /// The document's `type` value.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceAccount(_) => "service_account",
            Self::AuthorizedUser(_) => "authorized_user",
        }
    }

    /// Build a token source for `role` from whichever credential this is.
    pub fn into_token_source(
        self,
        role: &str,
        http: &reqwest::Client,
    ) -> Result<SharedTokenSource, CredentialError> {
        match self {
            Self::ServiceAccount(key) => Ok(Arc::new(key.token_source(role, http.clone())?)),
            Self::AuthorizedUser(user) => Ok(Arc::new(user.token_source()?)),
        }
    }
}

/// A service account key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub private_key_id: Option<String>,

    pub private_key: Secret,

    pub client_email: String,

    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    /// Build a JWT-bearer token source requesting `role`.
    pub fn token_source(
        &self,
        role: &str,
        http: reqwest::Client,
    ) -> Result<ServiceAccountTokenSource, CredentialError> {
        if self.client_email.is_empty() {
            return Err(CredentialError::MissingField {
                field: "client_email",
            });
        }
        if self.private_key.is_empty() {
            return Err(CredentialError::MissingField {
                field: "private_key",
            });
        }

        let signing_key = EncodingKey::from_rsa_pem(self.private_key.expose().as_bytes())
            .map_err(CredentialError::InvalidPrivateKey)?;

        let token_uri = self
            .token_uri
            .clone()
            .filter(|uri| !uri.is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
        url::Url::parse(&token_uri).map_err(|source| CredentialError::InvalidUrl {
            field: "token_uri",
            source,
        })?;

        Ok(ServiceAccountTokenSource {
            client_email: self.client_email.clone(),
            key_id: self.private_key_id.clone(),
            signing_key,
            scope: role.to_string(),
            token_uri,
            http,
        })
    }
}

/// User credentials with a long-lived refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUserCredentials {
    pub client_id: String,

    pub client_secret: Secret,

    pub refresh_token: Secret,

    #[serde(default)]
    pub token_uri: Option<String>,

    #[serde(default)]
    pub quota_project_id: Option<String>,
}

impl AuthorizedUserCredentials {
    /// Build a refresh-token source.
    pub fn token_source(&self) -> Result<RefreshTokenSource, CredentialError> {
        if self.client_id.is_empty() {
            return Err(CredentialError::MissingField { field: "client_id" });
        }
        if self.refresh_token.is_empty() {
            return Err(CredentialError::MissingField {
                field: "refresh_token",
            });
        }

        let token_uri = self
            .token_uri
            .clone()
            .filter(|uri| !uri.is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        let auth_url = AuthUrl::new(DEFAULT_AUTH_URI.to_string()).map_err(|source| {
            CredentialError::InvalidUrl {
                field: "auth_uri",
                source,
            }
        })?;
        let token_url = TokenUrl::new(token_uri.clone()).map_err(|source| {
            CredentialError::InvalidUrl {
                field: "token_uri",
                source,
            }
        })?;

        let client = BasicClient::new(
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.expose().to_string())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        Ok(RefreshTokenSource {
            client,
            token_uri,
            refresh_token: self.refresh_token.clone(),
        })
    }
}

/// Turns stored service account key material into a token source.
pub trait CredentialParser: Send + Sync {
    /// Parse a service account key JSON document and scope it to `role`.
    fn parse_service_account_json(
        &self,
        json: &[u8],
        role: &str,
    ) -> Result<SharedTokenSource, CredentialError>;
}

/// Parser producing [`ServiceAccountTokenSource`]s.
#[derive(Debug, Clone)]
pub struct JsonCredentialParser {
    http: reqwest::Client,
}

impl JsonCredentialParser {
    /// Create a parser whose token sources use `http`.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl CredentialParser for JsonCredentialParser {
    fn parse_service_account_json(
        &self,
        json: &[u8],
        role: &str,
    ) -> Result<SharedTokenSource, CredentialError> {
        match CredentialsFile::from_json(json)? {
            CredentialsFile::ServiceAccount(key) => {
                Ok(Arc::new(key.token_source(role, self.http.clone())?))
            }
            other => Err(CredentialError::UnsupportedType {
                found: other.kind().to_string(),
            }),
        }
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Exchanges a signed JWT assertion for an access token on every call.
pub struct ServiceAccountTokenSource {
    client_email: String,
    key_id: Option<String>,
    signing_key: EncodingKey,
    scope: String,
    token_uri: String,
    http: reqwest::Client,
}

impl ServiceAccountTokenSource {
    /// The service account this source authenticates as.
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// The endpoint assertions are exchanged at.
    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    fn assertion(&self) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: &self.scope,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        Ok(jsonwebtoken::encode(&header, &claims, &self.signing_key)?)
    }
}

impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("client_email", &self.client_email)
            .field("scope", &self.scope)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        let assertion = self.assertion()?;

        tracing::debug!("requesting access token for {}", self.client_email);

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        read_token_response(response).await
    }
}

/// Redeems a refresh token for an access token on every call.
pub struct RefreshTokenSource {
    client: BasicClient,
    token_uri: String,
    refresh_token: Secret,
}

impl std::fmt::Debug for RefreshTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenSource")
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(
                self.refresh_token.expose().to_string(),
            ))
            .request_async(async_http_client)
            .await
            .map_err(|e| TokenError::OAuthError {
                message: format!("refresh token grant failed: {}", e),
            })?;

        let mut token = Token::new(response.access_token().secret().as_str());
        if let Some(duration) = response.expires_in() {
            let expires_in =
                chrono::Duration::from_std(duration).map_err(|e| TokenError::OAuthError {
                    message: format!("invalid expiration duration: {}", e),
                })?;
            token = token.with_expiry(expiry_after(expires_in)?);
        }
        Ok(token)
    }
}
