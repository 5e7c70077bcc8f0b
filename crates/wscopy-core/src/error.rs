//! # Design
//!
//! - `ServiceError` covers every failure raised by a remote collaborator.
//! - Each transport failure carries whether it is worth retrying; the retry
//!   policy only ever looks at that flag.
//! - `ModelError` is reserved for parsing identifiers that cross a wire boundary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for collaborator calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failures raised while talking to a workspace, handle, blob, or sample service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network or HTTP level failure.
    #[error("{service}.{method} transport failure: {detail}")]
    Transport {
        /// Logical service name (e.g. `Workspace`).
        service: &'static str,
        /// Method or route that was being invoked.
        method: String,
        /// HTTP status when a response was received.
        status: Option<u16>,
        /// Whether the failure is transient (timeout, 5xx, reset).
        retryable: bool,
        /// Human-readable detail from the transport layer.
        detail: String,
    },
    /// The service answered with an application error.
    #[error("{service}.{method} rejected the request: {message}")]
    Rejected {
        /// Logical service name.
        service: &'static str,
        /// Method that was invoked.
        method: String,
        /// Service-specific error code when present.
        code: Option<i64>,
        /// Error message returned by the service.
        message: String,
    },
    /// The response did not have the expected shape.
    #[error("{service}.{method} returned an unexpected response: {detail}")]
    Decode {
        /// Logical service name.
        service: &'static str,
        /// Method that was invoked.
        method: String,
        /// Description of the mismatch.
        detail: String,
    },
    /// Local IO failure while staging or reading payloads.
    #[error("local io failure during {operation}")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl ServiceError {
    /// Whether retrying the same call could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                retryable: true,
                ..
            }
        )
    }

    /// Build a `Rejected` error.
    pub fn rejected(
        service: &'static str,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            service,
            method: method.into(),
            code: None,
            message: message.into(),
        }
    }

    /// Build a `Decode` error.
    pub fn decode(
        service: &'static str,
        method: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Decode {
            service,
            method: method.into(),
            detail: detail.into(),
        }
    }
}

/// Failures parsing identifiers exchanged with the services.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Object reference was not `container/object/version`.
    #[error("invalid object reference '{value}'")]
    InvalidObjectRef {
        /// Offending input.
        value: String,
    },
    /// Type string was not `Module.Type` or `Module.Type-major.minor`.
    #[error("invalid type string '{value}'")]
    InvalidTypeString {
        /// Offending input.
        value: String,
    },
    /// Object metadata carried half of an idempotency marker.
    #[error("incomplete copy marker: missing '{field}'")]
    IncompleteMarker {
        /// Metadata key that was absent.
        field: &'static str,
    },
}
