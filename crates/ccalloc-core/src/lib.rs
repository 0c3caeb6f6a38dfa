//! ccalloc-core - Fundamental types shared across the Multi-CIDR Range Allocator
//!
//! This crate provides:
//! - The `ClusterCIDR` domain type and its validation-relevant invariants
//! - Kubernetes-style `NodeSelector` evaluation
//! - The allocator's finalizer literal and informational event types
//! - Error types with miette diagnostics
//!
//! The `Node` type itself is not redefined here: it is reused directly from
//! `k8s-openapi`, since Nodes are a standard Kubernetes object the allocator
//! only reads labels/deletion-timestamp/podCIDRs from and patches podCIDRs
//! into.

pub mod error;
pub mod events;
pub mod selector;
pub mod types;

pub use error::{CoreError, Result};
pub use events::{AllocatorEvent, WatchEventType, WatchKind};
pub use selector::{NodeSelector, NodeSelectorOperator, NodeSelectorRequirement, NodeSelectorTerm};
pub use types::{ClusterCidr, ClusterCidrSpec, FINALIZER};

// Re-export the k8s-openapi Node type for convenience, mirroring how the
// rest of the workspace treats standard Kubernetes objects.
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::Node;
