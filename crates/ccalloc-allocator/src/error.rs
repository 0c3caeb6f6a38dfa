// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Allocator error type.
#[derive(Error, Debug, Diagnostic)]
pub enum AllocatorError {
    /// `AllocateNext` on an exhausted `CidrSet`
    #[error("ClusterCIDR '{cluster_cidr}' has no free sub-prefixes left")]
    #[diagnostic(
        code(ccalloc::allocator::cidr_range_full),
        help("Admit another ClusterCIDR covering this Node's labels, or wait for a release")
    )]
    CidrRangeFull {
        #[allow(unused)]
        cluster_cidr: String,
    },

    /// `Occupy` was asked to mark a CIDR that does not fall inside the set's parent
    #[error("CIDR '{cidr}' does not fall within ClusterCIDR '{cluster_cidr}'")]
    #[diagnostic(
        code(ccalloc::allocator::cidr_outside_range),
        help("This indicates a stale replay entry; the allocator will keep scanning other entries")
    )]
    CidrOutsideRange {
        #[allow(unused)]
        cidr: String,
        #[allow(unused)]
        cluster_cidr: String,
    },

    /// No admitted ClusterCIDR's selector matches the Node's labels
    #[error("no ClusterCIDR matches node '{node}'")]
    #[diagnostic(
        code(ccalloc::allocator::no_matching_cidr),
        help("Admit a ClusterCIDR whose nodeSelector matches this node's labels")
    )]
    NoMatchingCidr {
        #[allow(unused)]
        node: String,
    },

    /// An update attempted to change the immutable spec of an admitted entry
    #[error("ClusterCIDR '{name}' spec is immutable once admitted")]
    #[diagnostic(
        code(ccalloc::allocator::spec_immutable),
        help("Delete and recreate the ClusterCIDR instead")
    )]
    SpecImmutable {
        #[allow(unused)]
        name: String,
    },

    /// `ClusterCidrIndex::Remove` called on an entry with associated nodes
    #[error("cannot remove ClusterCIDR '{name}': {count} node(s) still associated")]
    #[diagnostic(
        code(ccalloc::allocator::entry_in_use),
        help("Wait for associated Nodes to be deleted or reassigned first")
    )]
    EntryInUse {
        #[allow(unused)]
        name: String,
        #[allow(unused)]
        count: usize,
    },

    /// Core-level validation/domain error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] ccalloc_core::CoreError),

    /// Object-store client error
    #[error(transparent)]
    #[diagnostic(transparent)]
    ClientError(#[from] ccalloc_client::ClientError),

    /// Internal error — a bug, not a domain condition
    #[error("internal allocator error: {message}")]
    #[diagnostic(
        code(ccalloc::allocator::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for allocator operations
pub type Result<T> = std::result::Result<T, AllocatorError>;

impl AllocatorError {
    pub fn cidr_range_full(cluster_cidr: impl Into<String>) -> Self {
        Self::CidrRangeFull {
            cluster_cidr: cluster_cidr.into(),
        }
    }

    pub fn cidr_outside_range(cidr: impl Into<String>, cluster_cidr: impl Into<String>) -> Self {
        Self::CidrOutsideRange {
            cidr: cidr.into(),
            cluster_cidr: cluster_cidr.into(),
        }
    }

    pub fn no_matching_cidr(node: impl Into<String>) -> Self {
        Self::NoMatchingCidr { node: node.into() }
    }

    pub fn spec_immutable(name: impl Into<String>) -> Self {
        Self::SpecImmutable { name: name.into() }
    }

    pub fn entry_in_use(name: impl Into<String>, count: usize) -> Self {
        Self::EntryInUse {
            name: name.into(),
            count,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// True for conditions the worker should re-queue rather than drop
    /// (rate-limited requeue, not a terminal failure).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CidrRangeFull { .. } | Self::NoMatchingCidr { .. } => true,
            Self::ClientError(e) => e.is_retryable(),
            Self::CidrOutsideRange { .. }
            | Self::SpecImmutable { .. }
            | Self::EntryInUse { .. }
            | Self::CoreError(_)
            | Self::InternalError { .. } => false,
        }
    }
}
