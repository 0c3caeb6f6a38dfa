// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for ClusterCIDR/Node domain operations, shared by the
/// allocator and client crates.
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// A CIDR string failed to parse or was not in canonical network form
    #[error("invalid CIDR '{cidr}': {reason}")]
    #[diagnostic(
        code(ccalloc::invalid_cidr),
        help("CIDRs must be in canonical network form, e.g. '10.0.0.0/16'")
    )]
    InvalidCidr {
        #[allow(unused)]
        cidr: String,
        #[allow(unused)]
        reason: String,
    },

    /// `ClusterCIDR.spec` failed validation
    #[error("invalid ClusterCIDR spec: {reason}")]
    #[diagnostic(
        code(ccalloc::invalid_spec),
        help("{suggestion}")
    )]
    InvalidSpec {
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// An update attempted to change an immutable field
    #[error("field '{field}' is immutable once the ClusterCIDR is created")]
    #[diagnostic(
        code(ccalloc::spec_immutable),
        help("Delete and recreate the ClusterCIDR instead of mutating '{field}'")
    )]
    SpecImmutable {
        #[allow(unused)]
        field: String,
    },

    /// Serialization error
    #[error("serialization error: {message}")]
    #[diagnostic(code(ccalloc::serialization_error), help("Check the object encoding"))]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error
    #[error("internal error: {message}")]
    #[diagnostic(
        code(ccalloc::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn invalid_cidr(cidr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCidr {
            cidr: cidr.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_spec(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn spec_immutable(field: impl Into<String>) -> Self {
        Self::SpecImmutable {
            field: field.into(),
        }
    }

    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::invalid_cidr("10.0.0.0/33", "prefix length out of range");
        assert!(matches!(err, CoreError::InvalidCidr { .. }));

        let err = CoreError::spec_immutable("spec.ipv4");
        assert!(matches!(err, CoreError::SpecImmutable { .. }));
    }
}
