//! Error Handling Module
//!
//! This module provides the canonical unit of failure reporting for the
//! library: [`UppError`] with a closed [`ErrorKind`] taxonomy.
//!
//! Transport-layer failures are classified into one of these kinds by the
//! provider adapter before they reach the retry engine; the retry engine
//! decides retry/no-retry purely from the kind.
//!
//! # Example
//!
//! ```rust
//! use upp::error::{ErrorKind, UppError};
//!
//! let error = UppError::new(ErrorKind::RateLimited, "429 from provider")
//!     .with_provider("openai");
//! assert!(error.is_retryable());
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Closed error taxonomy carried on every [`UppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Credentials were rejected or missing.
    AuthenticationFailed,
    /// The requested model does not exist for this provider.
    ModelNotFound,
    /// The provider throttled the request.
    RateLimited,
    /// Connection-level failure (DNS, TLS, reset, ...).
    NetworkError,
    /// The request or stream exceeded its time budget.
    Timeout,
    /// The provider reported a server-side failure.
    ProviderError,
    /// The request is invalid and will never succeed as-is.
    InvalidRequest,
    /// The caller cancelled the operation.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::ModelNotFound => "MODEL_NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// The canonical library error.
///
/// Immutable once constructed. The `cause` chain is stored behind an `Arc`
/// so the error stays `Clone` (the retry executor clones the last error
/// before deciding whether to surface it).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}{}{}: {message}", fmt_part(" provider=", .provider), fmt_part(" modality=", .modality))]
pub struct UppError {
    kind: ErrorKind,
    provider: Option<String>,
    modality: Option<String>,
    message: String,
    cause: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

fn fmt_part(prefix: &str, value: &Option<String>) -> String {
    match value {
        Some(v) => format!("{prefix}{v}"),
        None => String::new(),
    }
}

impl UppError {
    /// Create a new error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: None,
            modality: None,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the provider id this error originated from.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attach the modality ("chat", "embedding", ...) this error belongs to.
    pub fn with_modality(mut self, modality: impl Into<String>) -> Self {
        self.modality = Some(modality.into());
        self
    }

    /// Attach the underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// The error kind.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The provider id, if attributed.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// The modality, if attributed.
    pub fn modality(&self) -> Option<&str> {
        self.modality.as_deref()
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying cause, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Whether the default retry strategies consider this error transient.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::RateLimited
                | ErrorKind::NetworkError
                | ErrorKind::Timeout
                | ErrorKind::ProviderError
        )
    }

    // Shorthand constructors for the common kinds.

    /// `AUTHENTICATION_FAILED`
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationFailed, message)
    }

    /// `MODEL_NOT_FOUND`
    pub fn model_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelNotFound, message)
    }

    /// `RATE_LIMITED`
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    /// `NETWORK_ERROR`
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    /// `TIMEOUT`
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// `PROVIDER_ERROR`
    pub fn provider_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderError, message)
    }

    /// `INVALID_REQUEST`
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// `CANCELLED`
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled by caller")
    }
}
