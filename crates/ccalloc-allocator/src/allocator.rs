//! The Allocator: owns the ClusterCIDRIndex, drives the work
//! queue, and is the only place Node/ClusterCIDR state actually mutates.

use crate::cidr_set::CidrSetError;
use crate::error::{AllocatorError, Result};
use crate::index::{AllocatorEntry, ClusterCidrIndex};
use crate::queue::{QueueKey, WorkQueue};
use crate::validator;
use ccalloc_client::ApiClient;
use ccalloc_core::{ClusterCidr, Node};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns the allocator's entire in-memory state and is cheap to clone (all
/// interior state is behind `Arc`); worker tasks each hold a clone.
#[derive(Clone)]
pub struct Allocator {
    client: Arc<dyn ApiClient>,
    index: Arc<Mutex<ClusterCidrIndex>>,
    queue: Arc<WorkQueue>,
}

impl Allocator {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        Self {
            client,
            index: Arc::new(Mutex::new(ClusterCidrIndex::new())),
            queue: Arc::new(WorkQueue::new()),
        }
    }

    /// Startup barrier: admit every valid ClusterCIDR, then reconcile
    /// occupancy for every Node that already carries PodCIDRs. Must
    /// complete before `run` starts dequeuing events.
    pub async fn initial_sync(&self) -> Result<()> {
        let cluster_cidrs = self.client.list_cluster_cidrs().await?;
        {
            let mut index = self.index.lock().await;
            for cc in &cluster_cidrs {
                if cc.is_terminating() {
                    continue;
                }
                if let Err(e) = validator::validate_create(&cc.spec) {
                    error!(cluster_cidr = %cc.name, error = %e, "skipping invalid ClusterCIDR during initial sync");
                    continue;
                }
                if let Err(e) = index.admit(cc) {
                    error!(cluster_cidr = %cc.name, error = %e, "failed to admit ClusterCIDR during initial sync");
                }
            }
        }

        let nodes = self.client.list_nodes().await?;
        for node in &nodes {
            let pod_cidrs = pod_cidrs_of(node);
            if pod_cidrs.is_empty() {
                continue;
            }
            let Ok(name) = node_name(node) else { continue };
            let mut index = self.index.lock().await;
            if let Err(e) = reconcile_occupancy(&mut index, &name, &pod_cidrs) {
                warn!(node = %name, error = %e, "failed to reconcile occupancy during initial sync");
            }
        }

        info!(cluster_cidrs = cluster_cidrs.len(), "initial sync complete");
        Ok(())
    }

    /// Drives `workers` worker tasks until `cancel` fires. Each worker
    /// finishes its in-flight item before observing cancellation.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken, workers: usize) {
        let mut handles = Vec::new();
        for id in 0..workers.max(1) {
            let this = self.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { this.worker_loop(id, cancel).await }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(&self, id: usize, cancel: CancellationToken) {
        info!(worker = id, "allocator worker starting");
        loop {
            let Some(key) = self.queue.get(&cancel).await else {
                break;
            };
            self.process_key(&key).await;
            self.queue.done(&key).await;
        }
        info!(worker = id, "allocator worker stopped");
    }

    async fn process_key(&self, key: &QueueKey) {
        let result = match key.kind {
            ccalloc_core::WatchKind::Node => self.sync_node(&key.name).await,
            ccalloc_core::WatchKind::ClusterCidr => self.sync_cluster_cidr(&key.name).await,
        };
        match result {
            Ok(()) => self.queue.forget(key).await,
            Err(e) if e.is_retryable() => {
                warn!(kind = %key.kind, name = %key.name, error = %e, "retryable failure, requeuing");
                self.queue.requeue_rate_limited(key.clone()).await;
            }
            Err(e) => {
                error!(kind = %key.kind, name = %key.name, error = %e, "non-retryable failure, dropping item");
                self.queue.forget(key).await;
            }
        }
    }

    pub async fn enqueue_node(&self, name: impl Into<String>) {
        self.queue.add(QueueKey::node(name)).await;
    }

    pub async fn enqueue_cluster_cidr(&self, name: impl Into<String>) {
        self.queue.add(QueueKey::cluster_cidr(name)).await;
    }

    /// `OnNodeEvent(old, new, deleted)`: `new = None` stands for `deleted`.
    pub async fn on_node_event(&self, old: Option<&Node>, new: Option<&Node>) {
        if let Some(name) = new.and_then(|n| n.metadata.name.clone()).or_else(|| old.and_then(|n| n.metadata.name.clone())) {
            let event_type = watch_event_type(old.is_some(), new.is_some());
            info!(node = %name, event_type = %format!("{:?}", event_type), "node watch event");
            self.enqueue_node(name).await;
        }
    }

    /// `OnClusterCIDREvent(old, new, deleted)`.
    pub async fn on_cluster_cidr_event(&self, old: Option<&ClusterCidr>, new: Option<&ClusterCidr>) {
        if let Some(name) = new.map(|c| c.name.clone()).or_else(|| old.map(|c| c.name.clone())) {
            let event_type = watch_event_type(old.is_some(), new.is_some());
            info!(cluster_cidr = %name, event_type = %format!("{:?}", event_type), "ClusterCIDR watch event");
            self.enqueue_cluster_cidr(name).await;
        }
    }

    /// `AllocatedClusterCIDR(node)`: pure lookup for the reconciler shim.
    pub async fn allocated_cluster_cidr(&self, node_name: &str) -> Option<String> {
        self.index.lock().await.entry_for_node(node_name)
    }

    /// Node sync algorithm.
    pub async fn sync_node(&self, name: &str) -> Result<()> {
        let node = self.client.get_node(name).await?;

        let node = match node {
            Some(n) if n.metadata.deletion_timestamp.is_none() => n,
            _ => return self.release_node(name).await,
        };

        let pod_cidrs = pod_cidrs_of(&node);
        if !pod_cidrs.is_empty() {
            let mut index = self.index.lock().await;
            return reconcile_occupancy(&mut index, name, &pod_cidrs);
        }

        self.allocate_for_node(&node).await
    }

    async fn release_node(&self, node_name: &str) -> Result<()> {
        let mut to_finalize = Vec::new();
        {
            let mut index = self.index.lock().await;
            for entry in index.iter_mut() {
                if entry.release_node(node_name) && entry.terminating && entry.associated_nodes.is_empty() {
                    to_finalize.push(entry.name.clone());
                }
            }
        }
        for name in to_finalize {
            self.client.remove_finalizer(&name).await?;
            let mut index = self.index.lock().await;
            let _ = index.remove(&name);
            info!(cluster_cidr = %name, "finalizer removed, last associated node released");
        }
        Ok(())
    }

    async fn allocate_for_node(&self, node: &Node) -> Result<()> {
        let name = node_name(node)?;
        let labels = labels_of(node);

        let (entry_name, cidrs) = {
            let mut index = self.index.lock().await;
            let candidates = index.candidate_names(&labels);
            if candidates.is_empty() {
                return Err(AllocatorError::no_matching_cidr(name));
            }

            let mut chosen = None;
            for candidate in &candidates {
                let entry = index
                    .get_mut(candidate)
                    .ok_or_else(|| AllocatorError::internal_error("candidate vanished from index"))?;
                match allocate_from_entry(entry) {
                    Ok(cidrs) => {
                        chosen = Some((candidate.clone(), cidrs));
                        break;
                    }
                    Err(AllocatorError::CidrRangeFull { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }

            let Some((entry_name, cidrs)) = chosen else {
                return Err(AllocatorError::cidr_range_full(candidates.join(",")));
            };
            let entry = index
                .get_mut(&entry_name)
                .ok_or_else(|| AllocatorError::internal_error("entry vanished after allocation"))?;
            entry.record_node(name.clone(), cidrs.clone());
            (entry_name, cidrs)
        };

        match self.client.patch_node_pod_cidrs(&name, cidrs.clone()).await {
            Ok(_) => {
                info!(node = %name, cluster_cidr = %entry_name, cidrs = ?cidrs, "allocated pod CIDRs");
                let event = ccalloc_core::AllocatorEvent::cidr_assignment_succeeded(
                    &entry_name,
                    format!("allocated {:?} to node {}", cidrs, name),
                );
                self.client
                    .emit_cluster_cidr_event(&event.object_name, &event.reason, &event.message)
                    .await;
                Ok(())
            }
            Err(e) => {
                let mut index = self.index.lock().await;
                if let Some(entry) = index.get_mut(&entry_name) {
                    entry.release_node(&name);
                }
                warn!(node = %name, error = %e, "patch failed, released speculative allocation");
                let event = ccalloc_core::AllocatorEvent::cidr_assignment_failed(&name, e.to_string());
                self.client
                    .emit_node_event(&event.object_name, &event.reason, &event.message)
                    .await;
                Err(AllocatorError::from(e))
            }
        }
    }

    /// ClusterCIDR sync algorithm.
    pub async fn sync_cluster_cidr(&self, name: &str) -> Result<()> {
        let Some(cc) = self.client.get_cluster_cidr(name).await? else {
            let mut index = self.index.lock().await;
            let _ = index.remove(name);
            return Ok(());
        };

        if cc.is_terminating() {
            return self.reconcile_delete(&cc).await;
        }

        {
            let index = self.index.lock().await;
            if let Some(existing) = index.lookup(name) {
                validator::validate_update(&existing.spec, &cc.spec)?;
            } else {
                drop(index);
                validator::validate_create(&cc.spec)?;
                self.index.lock().await.admit(&cc)?;
            }
        }

        if !cc.has_finalizer() {
            self.client.add_finalizer(name).await?;
        }
        Ok(())
    }

    async fn reconcile_delete(&self, cc: &ClusterCidr) -> Result<()> {
        let associated = {
            let mut index = self.index.lock().await;
            match index.get_mut(&cc.name) {
                Some(entry) => {
                    entry.terminating = true;
                    entry.associated_nodes.len()
                }
                None => 0,
            }
        };

        if associated > 0 {
            return Ok(());
        }

        if cc.has_finalizer() {
            self.client.remove_finalizer(&cc.name).await?;
        }
        let mut index = self.index.lock().await;
        let _ = index.remove(&cc.name);
        Ok(())
    }
}

/// Allocate v4-then-v6 from `entry`, rolling back the v4 allocation if v6
/// subsequently fails so a dual-stack entry never leaves a stray v4 bit set.
fn allocate_from_entry(entry: &mut AllocatorEntry) -> Result<Vec<String>> {
    let mut cidrs = Vec::new();

    if let Some(v4) = entry.v4_set.as_mut() {
        match v4.allocate_next() {
            Ok(cidr) => cidrs.push(cidr),
            Err(CidrSetError::RangeFull) => return Err(AllocatorError::cidr_range_full(entry.name.clone())),
            Err(CidrSetError::OutsideRange) => {
                return Err(AllocatorError::internal_error("allocate_next returned OutsideRange"))
            }
        }
    }

    if let Some(v6) = entry.v6_set.as_mut() {
        match v6.allocate_next() {
            Ok(cidr) => cidrs.push(cidr),
            Err(CidrSetError::RangeFull) => {
                if let Some(v4_cidr) = cidrs.first() {
                    if let Some(v4) = entry.v4_set.as_mut() {
                        let _ = v4.release(v4_cidr);
                    }
                }
                return Err(AllocatorError::cidr_range_full(entry.name.clone()));
            }
            Err(CidrSetError::OutsideRange) => {
                return Err(AllocatorError::internal_error("allocate_next returned OutsideRange"))
            }
        }
    }

    Ok(cidrs)
}

/// Occupancy reconciliation: find the entry whose parent
/// contains `pod_cidrs` (first by cascading order if more than one could),
/// mark the bits occupied, and record the node.
fn reconcile_occupancy(index: &mut ClusterCidrIndex, node_name: &str, pod_cidrs: &[String]) -> Result<()> {
    let mut entry_name = None;
    for cidr in pod_cidrs {
        if let Some(first) = index.names_containing(cidr).into_iter().next() {
            entry_name = Some(first);
            break;
        }
    }
    let Some(entry_name) = entry_name else {
        return Err(AllocatorError::no_matching_cidr(node_name.to_string()));
    };

    let entry = index
        .get_mut(&entry_name)
        .ok_or_else(|| AllocatorError::internal_error("entry vanished during occupancy reconcile"))?;
    for cidr in pod_cidrs {
        let set = if cidr.contains(':') {
            entry.v6_set.as_mut()
        } else {
            entry.v4_set.as_mut()
        };
        if let Some(set) = set {
            set.occupy(cidr)
                .map_err(|_| AllocatorError::cidr_outside_range(cidr.clone(), entry_name.clone()))?;
        }
    }
    entry.record_node(node_name.to_string(), pod_cidrs.to_vec());
    Ok(())
}

fn node_name(node: &Node) -> Result<String> {
    node.metadata
        .name
        .clone()
        .ok_or_else(|| AllocatorError::internal_error("node has no metadata.name"))
}

fn labels_of(node: &Node) -> BTreeMap<String, String> {
    node.metadata.labels.clone().unwrap_or_default()
}

fn pod_cidrs_of(node: &Node) -> Vec<String> {
    node.spec.as_ref().and_then(|s| s.pod_cidrs.clone()).unwrap_or_default()
}

fn watch_event_type(had_old: bool, has_new: bool) -> ccalloc_core::WatchEventType {
    match (had_old, has_new) {
        (false, true) => ccalloc_core::WatchEventType::Added,
        (true, true) => ccalloc_core::WatchEventType::Modified,
        (_, false) => ccalloc_core::WatchEventType::Deleted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccalloc_client::MockApiClient;
    use ccalloc_core::{ClusterCidrSpec, NodeSelector, NodeSelectorOperator, NodeSelectorRequirement, NodeSelectorTerm};
    use k8s_openapi::api::core::v1::NodeSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(name: &str, labels: &[(&str, &str)]) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
                ..Default::default()
            },
            spec: Some(NodeSpec::default()),
            ..Default::default()
        }
    }

    fn bootstrap_cc(name: &str, ipv4: &str, ipv6: &str, per_node_host_bits: i32, selector: Option<NodeSelector>) -> ClusterCidr {
        ClusterCidr::new(
            name,
            ClusterCidrSpec {
                per_node_host_bits,
                ipv4: Some(ipv4.to_string()),
                ipv6: Some(ipv6.to_string()),
                node_selector: selector,
            },
        )
    }

    async fn seeded_allocator() -> (Allocator, Arc<MockApiClient>) {
        let mock = Arc::new(MockApiClient::new());
        mock.seed_cluster_cidr(bootstrap_cc("default-dual-stack", "10.96.0.0/12", "fd00:10:96::/112", 8, None))
            .await;
        let bootstrap_selector = Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: vec![NodeSelectorRequirement {
                    key: "bootstrap".to_string(),
                    operator: NodeSelectorOperator::In,
                    values: vec!["true".to_string()],
                }],
            }],
        });
        mock.seed_cluster_cidr(bootstrap_cc(
            "initial-cc",
            "10.2.0.0/16",
            "fd00:20:96::/112",
            8,
            bootstrap_selector,
        ))
        .await;

        let allocator = Allocator::new(mock.clone());
        allocator.initial_sync().await.unwrap();
        (allocator, mock)
    }

    #[tokio::test]
    async fn default_dual_stack_scenario() {
        let (allocator, mock) = seeded_allocator().await;
        mock.seed_node(node("node-a", &[("label", "unmatched")])).await;
        allocator.sync_node("node-a").await.unwrap();

        let stored = mock.node("node-a").await.unwrap();
        assert_eq!(
            stored.spec.unwrap().pod_cidrs.unwrap(),
            vec!["10.96.0.0/24".to_string(), "fd00:10:96::/120".to_string()]
        );
    }

    #[tokio::test]
    async fn bootstrap_selection_scenario() {
        let (allocator, mock) = seeded_allocator().await;
        // Pre-seed a node already occupying initial-cc's first sub-prefix.
        mock.seed_node(node("pre-existing", &[("bootstrap", "true")])).await;
        allocator.sync_node("pre-existing").await.unwrap();

        mock.seed_node(node("node-b", &[("bootstrap", "true")])).await;
        allocator.sync_node("node-b").await.unwrap();

        let stored = mock.node("node-b").await.unwrap();
        assert_eq!(
            stored.spec.unwrap().pod_cidrs.unwrap(),
            vec!["10.2.1.0/24".to_string(), "fd00:20:96::100/120".to_string()]
        );
    }

    #[tokio::test]
    async fn release_on_delete_scenario() {
        let mock = Arc::new(MockApiClient::new());
        mock.seed_cluster_cidr(ClusterCidr::new(
            "release-cc",
            ClusterCidrSpec {
                per_node_host_bits: 8,
                ipv4: Some("192.168.0.0/23".to_string()),
                ipv6: Some("fd00:30:100::/119".to_string()),
                node_selector: None,
            },
        ))
        .await;
        let allocator = Allocator::new(mock.clone());
        allocator.initial_sync().await.unwrap();

        mock.seed_node(node("node-a", &[])).await;
        allocator.sync_node("node-a").await.unwrap();
        mock.seed_node(node("node-b", &[])).await;
        allocator.sync_node("node-b").await.unwrap();

        let a = mock.node("node-a").await.unwrap();
        assert_eq!(
            a.spec.unwrap().pod_cidrs.unwrap(),
            vec!["192.168.0.0/24".to_string(), "fd00:30:100::/120".to_string()]
        );
        let b = mock.node("node-b").await.unwrap();
        assert_eq!(
            b.spec.unwrap().pod_cidrs.unwrap(),
            vec!["192.168.1.0/24".to_string(), "fd00:30:100::100/120".to_string()]
        );

        mock.delete_node("node-a").await;
        allocator.sync_node("node-a").await.unwrap();

        mock.seed_node(node("node-c", &[])).await;
        allocator.sync_node("node-c").await.unwrap();
        let c = mock.node("node-c").await.unwrap();
        assert_eq!(
            c.spec.unwrap().pod_cidrs.unwrap(),
            vec!["192.168.0.0/24".to_string(), "fd00:30:100::/120".to_string()]
        );
    }

    #[tokio::test]
    async fn single_stack_v4_scenario() {
        let mock = Arc::new(MockApiClient::new());
        let singlestack_selector = Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: vec![
                    NodeSelectorRequirement {
                        key: "ipv4".to_string(),
                        operator: NodeSelectorOperator::In,
                        values: vec!["true".to_string()],
                    },
                    NodeSelectorRequirement {
                        key: "singlestack".to_string(),
                        operator: NodeSelectorOperator::In,
                        values: vec!["true".to_string()],
                    },
                ],
            }],
        });
        mock.seed_cluster_cidr(ClusterCidr::new(
            "single-stack-v4",
            ClusterCidrSpec {
                per_node_host_bits: 8,
                ipv4: Some("10.0.0.0/16".to_string()),
                ipv6: None,
                node_selector: singlestack_selector,
            },
        ))
        .await;
        let allocator = Allocator::new(mock.clone());
        allocator.initial_sync().await.unwrap();

        mock.seed_node(node("node-a", &[("ipv4", "true"), ("singlestack", "true")])).await;
        allocator.sync_node("node-a").await.unwrap();

        let stored = mock.node("node-a").await.unwrap();
        assert_eq!(stored.spec.unwrap().pod_cidrs.unwrap(), vec!["10.0.0.0/24".to_string()]);
    }

    #[tokio::test]
    async fn no_matching_cidr_is_retryable_and_emits_node_event() {
        // Only a selector-gated pool is admitted; a node that doesn't match
        // its selector has no candidate at all.
        let mock = Arc::new(MockApiClient::new());
        let bootstrap_selector = Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: vec![NodeSelectorRequirement {
                    key: "bootstrap".to_string(),
                    operator: NodeSelectorOperator::In,
                    values: vec!["true".to_string()],
                }],
            }],
        });
        mock.seed_cluster_cidr(bootstrap_cc("initial-cc", "10.2.0.0/16", "fd00:20:96::/112", 8, bootstrap_selector))
            .await;
        let allocator = Allocator::new(mock.clone());
        allocator.initial_sync().await.unwrap();

        mock.seed_node(node("ghost", &[("totally", "unmatched-by-anything")])).await;
        let err = allocator.sync_node("ghost").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, AllocatorError::NoMatchingCidr { .. }));
    }

    #[tokio::test]
    async fn finalized_deletion_waits_for_associated_nodes() {
        let mock = Arc::new(MockApiClient::new());
        let cc = ClusterCidr::new(
            "finalize-me",
            ClusterCidrSpec {
                per_node_host_bits: 8,
                ipv4: Some("10.5.0.0/16".to_string()),
                ipv6: None,
                node_selector: None,
            },
        );
        mock.seed_cluster_cidr(cc).await;
        let allocator = Allocator::new(mock.clone());
        allocator.initial_sync().await.unwrap();
        allocator.sync_cluster_cidr("finalize-me").await.unwrap();
        assert!(mock.cluster_cidr("finalize-me").await.unwrap().has_finalizer());

        mock.seed_node(node("held-node", &[])).await;
        allocator.sync_node("held-node").await.unwrap();

        mock.delete_cluster_cidr("finalize-me").await;
        allocator.sync_cluster_cidr("finalize-me").await.unwrap();
        assert!(
            mock.cluster_cidr("finalize-me").await.unwrap().has_finalizer(),
            "finalizer must remain while a node is still associated"
        );

        mock.delete_node("held-node").await;
        allocator.sync_node("held-node").await.unwrap();
        allocator.sync_cluster_cidr("finalize-me").await.unwrap();
        assert!(mock.cluster_cidr("finalize-me").await.is_none(), "object disappears once the finalizer clears");
    }
}
