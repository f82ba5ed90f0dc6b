//! Resolver configuration.
//!
//! Defaults target the public Google endpoints. A TOML file may override any
//! subset of fields:
//!
//! ```toml
//! sts_endpoint = "https://sts.googleapis.com/v1/token"
//! iam_credentials_endpoint = "https://iamcredentials.googleapis.com"
//! metadata_host = "169.254.169.254"
//! http_timeout_secs = 30
//! credentials_file = "/var/run/secrets/gcp/key.json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::AuthError;

/// Environment variable naming an explicit credentials file.
pub const CREDENTIALS_FILE_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Environment variable overriding the metadata server host.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Security Token Service endpoint used for the federated exchange.
    pub sts_endpoint: String,

    /// Base URL of the IAM Credentials API.
    pub iam_credentials_endpoint: String,

    /// Host (and optional port) of the compute metadata server.
    pub metadata_host: String,

    /// Per-request timeout for every outbound HTTP call.
    pub http_timeout_secs: u64,

    /// Explicit credentials file for ambient resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            sts_endpoint: "https://sts.googleapis.com/v1/token".to_string(),
            iam_credentials_endpoint: "https://iamcredentials.googleapis.com".to_string(),
            metadata_host: "169.254.169.254".to_string(),
            http_timeout_secs: 30,
            credentials_file: None,
        }
    }
}

impl ResolverConfig {
    /// Defaults with overrides from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `GOOGLE_APPLICATION_CREDENTIALS` and `GCE_METADATA_HOST` as
    /// returned by `lookup`. Empty values are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(CREDENTIALS_FILE_ENV).filter(|v| !v.is_empty()) {
            self.credentials_file = Some(PathBuf::from(path));
        }
        if let Some(host) = lookup(METADATA_HOST_ENV).filter(|v| !v.is_empty()) {
            self.metadata_host = host;
        }
        self
    }

    /// Parse a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, AuthError> {
        let config: Self = toml::from_str(contents).map_err(|e| AuthError::Config {
            message: format!("failed to parse resolver config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| AuthError::Config {
            message: format!("failed to read config from {:?}: {}", path, e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check endpoints and timeouts.
    pub fn validate(&self) -> Result<(), AuthError> {
        for (field, value) in [
            ("sts_endpoint", &self.sts_endpoint),
            ("iam_credentials_endpoint", &self.iam_credentials_endpoint),
        ] {
            Url::parse(value).map_err(|e| AuthError::Config {
                message: format!("invalid {} {:?}: {}", field, value, e),
            })?;
        }

        if self.metadata_host.is_empty() || self.metadata_host.contains('/') {
            return Err(AuthError::Config {
                message: format!("invalid metadata_host {:?}", self.metadata_host),
            });
        }

        if self.http_timeout_secs == 0 {
            return Err(AuthError::Config {
                message: "http_timeout_secs must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// The per-request HTTP timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Build the HTTP client shared by the production collaborators.
    pub fn http_client(&self) -> Result<reqwest::Client, AuthError> {
        reqwest::Client::builder()
            .timeout(self.http_timeout())
            .build()
            .map_err(|e| AuthError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ResolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ResolverConfig::from_toml_str(
            r#"
            metadata_host = "metadata.google.internal"
            http_timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.metadata_host, "metadata.google.internal");
        assert_eq!(config.http_timeout_secs, 5);
        assert_eq!(config.sts_endpoint, ResolverConfig::default().sts_endpoint);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let result = ResolverConfig::from_toml_str(r#"sts_endpoint = "not a url""#);
        assert!(matches!(result, Err(AuthError::Config { .. })));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = ResolverConfig::from_toml_str("http_timeout_secs = 0");
        assert!(matches!(result, Err(AuthError::Config { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let config = ResolverConfig::default().with_env_overrides(|name| match name {
            CREDENTIALS_FILE_ENV => Some("/tmp/key.json".to_string()),
            METADATA_HOST_ENV => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.credentials_file, Some(PathBuf::from("/tmp/key.json")));
        assert_eq!(config.metadata_host, "169.254.169.254");
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "credentials_file = \"/etc/gcp/key.json\"").unwrap();

        let config = ResolverConfig::load_from_path(file.path()).unwrap();
        assert_eq!(
            config.credentials_file,
            Some(PathBuf::from("/etc/gcp/key.json"))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = ResolverConfig::load_from_path("/nonexistent/resolver.toml");
        assert!(matches!(result, Err(AuthError::Config { .. })));
    }
}
