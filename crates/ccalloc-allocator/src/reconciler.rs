//! Reconciler shim: translates an external controller-runtime
//! style Reconcile request into calls on the [`Allocator`]. A Node's PodCIDR
//! change is fanned out to its owning ClusterCIDR key so pending-finalizer
//! reconciliations wake up too.

use crate::allocator::Allocator;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
    Node,
    ClusterCidr,
}

#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub kind: ReconcileKind,
    pub name: String,
}

impl ReconcileRequest {
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            kind: ReconcileKind::Node,
            name: name.into(),
        }
    }

    pub fn cluster_cidr(name: impl Into<String>) -> Self {
        Self {
            kind: ReconcileKind::ClusterCidr,
            name: name.into(),
        }
    }
}

pub struct Reconciler {
    allocator: Arc<Allocator>,
}

impl Reconciler {
    pub fn new(allocator: Arc<Allocator>) -> Self {
        Self { allocator }
    }

    pub async fn reconcile(&self, req: ReconcileRequest) {
        match req.kind {
            ReconcileKind::Node => {
                self.allocator.enqueue_node(req.name.clone()).await;
                if let Some(owner) = self.allocator.allocated_cluster_cidr(&req.name).await {
                    self.allocator.enqueue_cluster_cidr(owner).await;
                }
            }
            ReconcileKind::ClusterCidr => {
                self.allocator.enqueue_cluster_cidr(req.name).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccalloc_client::MockApiClient;
    use ccalloc_core::{ClusterCidr, ClusterCidrSpec};
    use k8s_openapi::api::core::v1::{Node, NodeSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[tokio::test]
    async fn node_reconcile_also_wakes_owning_cluster_cidr() {
        let mock = Arc::new(MockApiClient::new());
        mock.seed_cluster_cidr(ClusterCidr::new(
            "cc-1",
            ClusterCidrSpec {
                per_node_host_bits: 8,
                ipv4: Some("10.9.0.0/16".to_string()),
                ipv6: None,
                node_selector: None,
            },
        ))
        .await;
        let allocator = Arc::new(Allocator::new(mock.clone()));
        allocator.initial_sync().await.unwrap();

        mock.seed_node(Node {
            metadata: ObjectMeta {
                name: Some("node-1".to_string()),
                ..Default::default()
            },
            spec: Some(NodeSpec::default()),
            ..Default::default()
        })
        .await;
        allocator.sync_node("node-1").await.unwrap();
        assert_eq!(allocator.allocated_cluster_cidr("node-1").await, Some("cc-1".to_string()));

        // Should not panic, and should enqueue both the node key and its
        // owning ClusterCIDR key (verified indirectly: processing either
        // key afterward must still see consistent state).
        let reconciler = Reconciler::new(allocator.clone());
        reconciler.reconcile(ReconcileRequest::node("node-1")).await;
        allocator.sync_cluster_cidr("cc-1").await.unwrap();
        assert!(mock.cluster_cidr("cc-1").await.unwrap().has_finalizer());
    }
}
