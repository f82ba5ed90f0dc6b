//! Platform default credentials.
//!
//! [`DefaultCredentials`] looks for credentials in this order:
//!
//! 1. An explicit credentials file (config or `GOOGLE_APPLICATION_CREDENTIALS`)
//! 2. The gcloud application-default credentials file
//! 3. The compute metadata server
//!
//! An explicit file that is missing or malformed is an error; it never falls
//! through to later sources.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ResolverConfig;
use crate::credentials::{CredentialError, CredentialsFile};
use crate::token::{SharedTokenSource, Token, TokenError, TokenSource, read_token_response};

const WELL_KNOWN_FILE: &str = "application_default_credentials.json";
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";
const METADATA_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Error type for default credential lookup.
#[derive(Debug, Error)]
pub enum AmbientError {
    /// A credentials file could not be read.
    #[error("failed to read credentials file {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A credentials file could not be parsed.
    #[error("failed to load credentials from {path:?}: {source}")]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: CredentialError,
    },

    /// No source of default credentials is available.
    #[error("could not find default credentials")]
    NotFound,
}

/// The platform's default credential mechanism.
#[async_trait]
pub trait AmbientCredentials: Send + Sync {
    /// Obtain a token source for `role` from the environment.
    async fn default_credentials(&self, role: &str) -> Result<SharedTokenSource, AmbientError>;
}

/// Application default credentials lookup.
#[derive(Debug, Clone)]
pub struct DefaultCredentials {
    credentials_file: Option<PathBuf>,
    well_known_file: Option<PathBuf>,
    metadata_host: String,
    probe_timeout: Duration,
    http: reqwest::Client,
}

impl DefaultCredentials {
    /// Create a lookup from resolver configuration.
    pub fn new(config: &ResolverConfig, http: reqwest::Client) -> Self {
        Self {
            credentials_file: config.credentials_file.clone(),
            well_known_file: well_known_file(),
            metadata_host: config.metadata_host.clone(),
            probe_timeout: METADATA_PROBE_TIMEOUT,
            http,
        }
    }

    /// Override how long the metadata server probe may take.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Override the gcloud credentials file location.
    pub fn with_well_known_file(mut self, path: Option<PathBuf>) -> Self {
        self.well_known_file = path;
        self
    }

    async fn load_file(
        &self,
        path: &Path,
        role: &str,
    ) -> Result<SharedTokenSource, AmbientError> {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|source| AmbientError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;

        CredentialsFile::from_json(&contents)
            .and_then(|file| {
                debug!("loaded {} credentials from {:?}", file.kind(), path);
                file.into_token_source(role, &self.http)
            })
            .map_err(|source| AmbientError::InvalidFile {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn on_gce(&self) -> bool {
        let probe = self
            .http
            .get(format!("http://{}/", self.metadata_host))
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .timeout(self.probe_timeout)
            .send()
            .await;

        match probe {
            Ok(response) => response
                .headers()
                .get(METADATA_FLAVOR_HEADER)
                .is_some_and(|value| value == METADATA_FLAVOR),
            Err(e) => {
                debug!("metadata server unavailable: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl AmbientCredentials for DefaultCredentials {
    async fn default_credentials(&self, role: &str) -> Result<SharedTokenSource, AmbientError> {
        if let Some(path) = &self.credentials_file {
            info!("using credentials file {:?}", path);
            return self.load_file(path, role).await;
        }

        if let Some(path) = self.well_known_file.as_deref() {
            if is_file(path).await {
                info!("using application default credentials from {:?}", path);
                return self.load_file(path, role).await;
            }
        }

        if self.on_gce().await {
            info!("using metadata server credentials");
            return Ok(Arc::new(MetadataTokenSource::new(
                &self.metadata_host,
                role,
                self.http.clone(),
            )));
        }

        Err(AmbientError::NotFound)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file())
}

/// Location of the gcloud application-default credentials file.
fn well_known_file() -> Option<PathBuf> {
    let dirs = directories::BaseDirs::new()?;
    let gcloud = if cfg!(windows) {
        dirs.config_dir().join("gcloud")
    } else {
        dirs.home_dir().join(".config").join("gcloud")
    };
    Some(gcloud.join(WELL_KNOWN_FILE))
}

/// Fetches the default service account's token from the metadata server.
#[derive(Debug, Clone)]
pub struct MetadataTokenSource {
    token_url: String,
    scope: String,
    http: reqwest::Client,
}

impl MetadataTokenSource {
    /// Create a source against the metadata server at `host`.
    pub fn new(host: &str, role: &str, http: reqwest::Client) -> Self {
        Self {
            token_url: format!(
                "http://{}/computeMetadata/v1/instance/service-accounts/default/token",
                host
            ),
            scope: role.to_string(),
            http,
        }
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        let response = self
            .http
            .get(&self.token_url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .query(&[("scopes", self.scope.as_str())])
            .send()
            .await?;

        read_token_response(response).await
    }
}
