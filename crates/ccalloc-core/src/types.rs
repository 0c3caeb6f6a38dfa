use crate::selector::NodeSelector;
use serde::{Deserialize, Serialize};

/// The allocator's finalizer literal. Attached to every admitted
/// `ClusterCIDR` while it has associated nodes; removal is the last step of
/// the ClusterCIDR deletion protocol.
pub const FINALIZER: &str = "networking/cluster-cidr-controller";

/// `ClusterCIDR.spec`: immutable once the object is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCidrSpec {
    #[serde(rename = "perNodeHostBits")]
    pub per_node_host_bits: i32,
    #[serde(default)]
    pub ipv4: Option<String>,
    #[serde(default)]
    pub ipv6: Option<String>,
    #[serde(default, rename = "nodeSelector")]
    pub node_selector: Option<NodeSelector>,
}

/// Minimal representation of the cluster-scoped `ClusterCIDR` object (group
/// `networking.x-k8s.io`, version `v1`, plural `clustercidrs`). Only the
/// fields the allocator reads or writes are modelled; this is not a generic
/// Kubernetes object type, unlike the Node type reused from `k8s-openapi`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCidr {
    pub name: String,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default, rename = "deletionTimestamp")]
    pub deletion_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub spec: ClusterCidrSpec,
}

impl ClusterCidr {
    pub fn new(name: impl Into<String>, spec: ClusterCidrSpec) -> Self {
        Self {
            name: name.into(),
            finalizers: Vec::new(),
            deletion_timestamp: None,
            spec,
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers.iter().any(|f| f == FINALIZER)
    }
}
