use crate::error::{ClientError, Result};
use crate::traits::ApiClient;
use async_trait::async_trait;
use ccalloc_core::{ClusterCidr, Node};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// In-memory `ApiClient` for tests, mirroring the real object store closely
/// enough to exercise the allocator's retry-on-conflict and finalizer logic
/// without a live API server.
#[derive(Default)]
pub struct MockApiClient {
    nodes: Mutex<HashMap<String, Node>>,
    cluster_cidrs: Mutex<HashMap<String, ClusterCidr>>,
    /// Node names whose next `patch_node_pod_cidrs` call should fail with a
    /// conflict, simulating a concurrent resource-version race.
    conflict_once: Mutex<HashSet<String>>,
    pub events: Mutex<Vec<(String, String, String)>>,
}

impl MockApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_node(&self, node: Node) {
        let name = node.metadata.name.clone().expect("node must have a name");
        self.nodes.lock().await.insert(name, node);
    }

    pub async fn seed_cluster_cidr(&self, cc: ClusterCidr) {
        self.cluster_cidrs.lock().await.insert(cc.name.clone(), cc);
    }

    pub async fn delete_node(&self, name: &str) {
        self.nodes.lock().await.remove(name);
    }

    pub async fn node(&self, name: &str) -> Option<Node> {
        self.nodes.lock().await.get(name).cloned()
    }

    pub async fn cluster_cidr(&self, name: &str) -> Option<ClusterCidr> {
        self.cluster_cidrs.lock().await.get(name).cloned()
    }

    /// Make the next patch to this node's podCIDRs fail with a conflict.
    pub async fn inject_conflict(&self, node_name: &str) {
        self.conflict_once.lock().await.insert(node_name.to_string());
    }
}

#[async_trait]
impl ApiClient for MockApiClient {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes.lock().await.values().cloned().collect())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.nodes.lock().await.get(name).cloned())
    }

    async fn patch_node_pod_cidrs(&self, name: &str, pod_cidrs: Vec<String>) -> Result<Node> {
        if self.conflict_once.lock().await.remove(name) {
            return Err(ClientError::conflict("Node", name));
        }

        let mut nodes = self.nodes.lock().await;
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| ClientError::not_found("Node", name))?;
        let spec = node.spec.get_or_insert_with(Default::default);
        spec.pod_cidrs = Some(pod_cidrs);
        Ok(node.clone())
    }

    async fn list_cluster_cidrs(&self) -> Result<Vec<ClusterCidr>> {
        Ok(self.cluster_cidrs.lock().await.values().cloned().collect())
    }

    async fn get_cluster_cidr(&self, name: &str) -> Result<Option<ClusterCidr>> {
        Ok(self.cluster_cidrs.lock().await.get(name).cloned())
    }

    async fn create_cluster_cidr(&self, cc: &ClusterCidr) -> Result<()> {
        let mut ccs = self.cluster_cidrs.lock().await;
        ccs.entry(cc.name.clone()).or_insert_with(|| cc.clone());
        Ok(())
    }

    async fn add_finalizer(&self, name: &str) -> Result<()> {
        let mut ccs = self.cluster_cidrs.lock().await;
        let cc = ccs
            .get_mut(name)
            .ok_or_else(|| ClientError::not_found("ClusterCIDR", name))?;
        if !cc.has_finalizer() {
            cc.finalizers.push(ccalloc_core::FINALIZER.to_string());
        }
        Ok(())
    }

    async fn remove_finalizer(&self, name: &str) -> Result<()> {
        let mut ccs = self.cluster_cidrs.lock().await;
        let cc = ccs
            .get_mut(name)
            .ok_or_else(|| ClientError::not_found("ClusterCIDR", name))?;
        cc.finalizers.retain(|f| f != ccalloc_core::FINALIZER);
        // Mirror the real API server: once the finalizer list empties on a
        // terminating object, it is garbage-collected immediately.
        if cc.is_terminating() && cc.finalizers.is_empty() {
            ccs.remove(name);
        }
        Ok(())
    }

    async fn delete_cluster_cidr(&self, name: &str) -> Result<()> {
        use chrono::Utc;
        let mut ccs = self.cluster_cidrs.lock().await;
        if let Some(cc) = ccs.get_mut(name) {
            cc.deletion_timestamp = Some(Utc::now());
        }
        Ok(())
    }

    async fn emit_node_event(&self, node_name: &str, reason: &str, message: &str) {
        self.events.lock().await.push((
            node_name.to_string(),
            reason.to_string(),
            message.to_string(),
        ));
    }

    async fn emit_cluster_cidr_event(&self, name: &str, reason: &str, message: &str) {
        self.events
            .lock()
            .await
            .push((name.to_string(), reason.to_string(), message.to_string()));
    }
}
