//! Access tokens and token sources.
//!
//! This module provides:
//! - [`Token`] - A short-lived bearer token with metadata
//! - [`TokenSource`] - Trait for anything that yields tokens on demand
//! - [`StaticTokenSource`] - A source that always yields the same token
//! - [`TokenError`] - Failures while obtaining a token

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::kube::Secret;

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The HTTP request to a token endpoint failed.
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint answered with an error status.
    #[error("token endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    /// The token endpoint answered with an unusable body.
    #[error("malformed token response: {message}")]
    MalformedResponse { message: String },

    /// Signing the JWT assertion failed.
    #[error("failed to sign assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// OAuth flow failed.
    #[error("OAuth flow failed: {message}")]
    OAuthError { message: String },
}

/// A single access token with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// The token value.
    pub access_token: Secret,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// When this token expires (None if unknown or non-expiring).
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Create a new bearer token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            token_type: "Bearer".to_string(),
            expires_at: None,
        }
    }

    /// Create a token with an expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Create a token with a specific token type.
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Check if this token has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp < Utc::now()).unwrap_or(false)
    }

    /// Value for an HTTP `Authorization` header.
    ///
    /// Never log the result.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token.expose())
    }
}

/// Anything that yields access tokens on demand.
///
/// The caller owns the source after resolution and decides how long to keep
/// it. Implementations do not cache.
#[async_trait]
pub trait TokenSource: Send + Sync + std::fmt::Debug {
    /// Obtain an access token.
    async fn token(&self) -> Result<Token, TokenError>;
}

/// Shared handle to a token source.
pub type SharedTokenSource = Arc<dyn TokenSource>;

/// A token source that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: Token,
}

impl StaticTokenSource {
    /// Wrap a token.
    pub fn new(token: Token) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        Ok(self.token.clone())
    }
}

/// Successful response of an OAuth 2.0 token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenEndpointResponse {
    pub(crate) fn into_token(self) -> Result<Token, TokenError> {
        if self.access_token.is_empty() {
            return Err(TokenError::MalformedResponse {
                message: "empty access_token".to_string(),
            });
        }

        let mut token = Token::new(self.access_token);
        if let Some(token_type) = self.token_type.filter(|t| !t.is_empty()) {
            token = token.with_token_type(token_type);
        }
        if let Some(expires_in) = self.expires_in {
            let lifetime = chrono::Duration::try_seconds(expires_in).ok_or_else(|| {
                TokenError::MalformedResponse {
                    message: format!("expires_in out of range: {}", expires_in),
                }
            })?;
            token = token.with_expiry(expiry_after(lifetime)?);
        }
        Ok(token)
    }
}

/// The instant `lifetime` from now, rejecting lifetimes past chrono's range.
pub(crate) fn expiry_after(lifetime: chrono::Duration) -> Result<DateTime<Utc>, TokenError> {
    Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| TokenError::MalformedResponse {
            message: format!("token lifetime out of range: {}", lifetime),
        })
}

/// Check the status of a token endpoint response and decode its body.
pub(crate) async fn read_json_response<T>(response: reqwest::Response) -> Result<T, TokenError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TokenError::Endpoint {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| TokenError::MalformedResponse {
        message: e.to_string(),
    })
}

/// Decode an OAuth 2.0 token endpoint response into a [`Token`].
pub(crate) async fn read_token_response(response: reqwest::Response) -> Result<Token, TokenError> {
    read_json_response::<TokenEndpointResponse>(response)
        .await?
        .into_token()
}
