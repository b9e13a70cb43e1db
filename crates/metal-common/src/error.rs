//! Error types for the metal extension
//!
//! Errors carry enough context (field paths, resource names) to be useful in
//! admission denials and condition messages without further wrapping.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for metal extension operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// User-supplied configuration failed validation
    #[error("invalid configuration{}: {message}", at_field(.field))]
    InvalidConfig {
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "etcd.backup.deltaSnapshotPeriod")
        field: Option<String>,
    },

    /// A referenced resource (image, secret, key) is absent
    #[error("{kind} {name} not found")]
    NotFound {
        /// What was looked up (e.g., "image", "secret")
        kind: String,
        /// Name or key that was looked up
        name: String,
    },

    /// A secret carries an `issued-at-time` label that is not a Unix timestamp
    #[error("secret {secret} has malformed issued-at-time label {value:?}")]
    MalformedTimestamp {
        /// Name of the offending secret
        secret: String,
        /// The label value as found
        value: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "health", "webhook")
        context: String,
    },
}

impl Error {
    /// Create a configuration error without a field path
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a field path
    pub fn invalid_config_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Configuration and data-shape errors need a fix before a retry can
    /// succeed. Kubernetes transport errors are retried by the host.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::InvalidConfig { .. } => false,
            Error::NotFound { .. } => false,
            Error::MalformedTimestamp { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Whether this error is a Kubernetes 404 or a lookup miss
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube { source } => is_kube_not_found(source),
            _ => false,
        }
    }
}

/// Whether a kube-rs error is an API 404
pub fn is_kube_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

fn at_field(field: &Option<String>) -> String {
    field.as_ref().map(|f| format!(" at {f}")).unwrap_or_default()
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
