//! Top-level error type for token source resolution.

use thiserror::Error;

use crate::ambient::AmbientError;
use crate::credentials::CredentialError;
use crate::kube::StoreError;
use crate::workload_identity::ExchangeError;

/// Error returned by [`TokenSourceResolver::resolve`](crate::TokenSourceResolver::resolve).
///
/// Every variant that wraps a collaborator failure keeps it reachable through
/// [`std::error::Error::source`]. Nothing here is retried.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Reading the credentials secret failed.
    #[error("failed to read credentials secret: {0}")]
    SecretRead(#[from] StoreError),

    /// The stored service account key could not be parsed.
    #[error("failed to process the provided JSON credentials: {source}")]
    CredentialFormat {
        #[source]
        source: CredentialError,
    },

    /// The workload identity backend could not be initialized.
    #[error("unable to initialize workload identity: {source}")]
    ProviderInit {
        #[source]
        source: ExchangeError,
    },

    /// Exchanging the service account identity for a token failed.
    #[error("workload identity token exchange failed: {0}")]
    TokenExchange(#[from] ExchangeError),

    /// The platform default credentials could not be obtained.
    #[error("failed to obtain default credentials: {0}")]
    AmbientCredential(#[from] AmbientError),

    /// The caller cancelled the resolution.
    #[error("token source resolution cancelled")]
    Cancelled,

    /// The caller's deadline passed before resolution finished.
    #[error("token source resolution deadline exceeded")]
    DeadlineExceeded,

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl AuthError {
    /// Check if the error came from cancellation or an expired deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NamespacedName;
    use std::error::Error as _;

    #[test]
    fn test_wrapped_cause_is_source() {
        let err = AuthError::from(AmbientError::NotFound);
        let source = err.source().unwrap();
        assert!(matches!(
            source.downcast_ref::<AmbientError>(),
            Some(AmbientError::NotFound)
        ));

        let err = AuthError::from(StoreError::SecretNotFound {
            secret: NamespacedName::new("ns1", "s1"),
        });
        assert!(err.source().unwrap().downcast_ref::<StoreError>().is_some());
        assert_eq!(
            err.to_string(),
            "failed to read credentials secret: secret not found: ns1/s1"
        );

        let err = AuthError::from(ExchangeError::Closed);
        assert!(err.source().unwrap().downcast_ref::<ExchangeError>().is_some());
    }

    #[test]
    fn test_cancellation_has_no_source() {
        assert!(AuthError::Cancelled.source().is_none());
        assert!(AuthError::Cancelled.is_cancellation());
        assert!(!AuthError::from(AmbientError::NotFound).is_cancellation());
    }
}
