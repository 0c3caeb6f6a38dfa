use crate::error::Result;
use async_trait::async_trait;
use ccalloc_core::{ClusterCidr, Node};

/// The sole I/O seam between the allocator/reconciler and the external
/// object store. Implementations talk to the real API server
/// over HTTP ([`crate::api_client::HttpApiClient`]) or serve an in-memory
/// fixture for tests ([`crate::mock::MockApiClient`]).
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// List every Node currently known to the object store.
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Fetch a single Node by name; `Ok(None)` means it does not exist.
    async fn get_node(&self, name: &str) -> Result<Option<Node>>;

    /// Patch `spec.podCIDRs` on a Node, leaving every other field untouched.
    /// Returns [`crate::ClientError::Conflict`] on a resource-version race or
    /// if the Node was deleted concurrently.
    async fn patch_node_pod_cidrs(&self, name: &str, pod_cidrs: Vec<String>) -> Result<Node>;

    /// List every admitted or pending `ClusterCIDR`.
    async fn list_cluster_cidrs(&self) -> Result<Vec<ClusterCidr>>;

    /// Fetch a single `ClusterCIDR` by name; `Ok(None)` means it does not exist.
    async fn get_cluster_cidr(&self, name: &str) -> Result<Option<ClusterCidr>>;

    /// Create a new `ClusterCIDR`. Used by the bootstrap CLI to seed a
    /// fresh cluster before any administrator has created one through the
    /// real API. A name collision with an existing object is a no-op.
    async fn create_cluster_cidr(&self, cc: &ClusterCidr) -> Result<()>;

    /// Attach the allocator's finalizer (idempotent).
    async fn add_finalizer(&self, name: &str) -> Result<()>;

    /// Remove the allocator's finalizer (idempotent). The last step before a
    /// terminating `ClusterCIDR` disappears.
    async fn remove_finalizer(&self, name: &str) -> Result<()>;

    /// Request deletion of a `ClusterCIDR`. Used only by validator-adjacent
    /// tooling and tests; the Allocator itself never initiates deletion.
    async fn delete_cluster_cidr(&self, name: &str) -> Result<()>;

    /// Best-effort informational event against a Node. Failures are logged,
    /// never surfaced.
    async fn emit_node_event(&self, node_name: &str, reason: &str, message: &str);

    /// Best-effort informational event against a `ClusterCIDR`. Failures are
    /// logged, never surfaced.
    async fn emit_cluster_cidr_event(&self, name: &str, reason: &str, message: &str);
}
