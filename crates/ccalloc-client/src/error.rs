// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for the object-store client seam.
#[derive(Error, Debug, Diagnostic)]
pub enum ClientError {
    /// The object does not exist
    #[error("{kind} '{name}' not found")]
    #[diagnostic(
        code(ccalloc::client::not_found),
        help("It may have been deleted concurrently; treat as a Node/ClusterCIDR deletion")
    )]
    NotFound {
        #[allow(unused)]
        kind: &'static str,
        #[allow(unused)]
        name: String,
    },

    /// A write lost a resource-version race
    #[error("conflicting update to {kind} '{name}'")]
    #[diagnostic(
        code(ccalloc::client::conflict),
        help("Re-fetch the object and retry the patch")
    )]
    Conflict {
        #[allow(unused)]
        kind: &'static str,
        #[allow(unused)]
        name: String,
    },

    /// Transport-level failure (timeout, connection reset, non-2xx response)
    #[error("request to the object store failed: {message}")]
    #[diagnostic(
        code(ccalloc::client::transport_error),
        help("Check connectivity to the API server and retry")
    )]
    TransportError {
        #[allow(unused)]
        message: String,
    },

    /// Core error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] ccalloc_core::CoreError),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
        }
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    /// True for errors a caller should treat as "try again", as opposed to
    /// ones requiring the key to be dropped or surfaced synchronously.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::NotFound { .. } | Self::TransportError { .. })
    }
}
