use serde::{Deserialize, Serialize};

/// The kind of change a watch stream reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// Which watch stream a [`crate::WatchItem`]-style queue item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchKind {
    Node,
    ClusterCidr,
}

impl std::fmt::Display for WatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchKind::Node => write!(f, "Node"),
            WatchKind::ClusterCidr => write!(f, "ClusterCIDR"),
        }
    }
}

/// A best-effort, informational event the allocator reports against a Node
/// or ClusterCIDR object. Never fatal to emit or
/// fail to emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorEvent {
    pub kind: WatchKind,
    pub object_name: String,
    pub reason: String,
    pub message: String,
}

impl AllocatorEvent {
    pub fn cidr_assignment_failed(node_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: WatchKind::Node,
            object_name: node_name.into(),
            reason: "CIDRAssignmentFailed".to_string(),
            message: message.into(),
        }
    }

    pub fn cidr_assignment_succeeded(
        cluster_cidr_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: WatchKind::ClusterCidr,
            object_name: cluster_cidr_name.into(),
            reason: "CIDRAssignmentSucceeded".to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_expected_reasons() {
        let failed = AllocatorEvent::cidr_assignment_failed("node-1", "no matching ClusterCIDR");
        assert_eq!(failed.reason, "CIDRAssignmentFailed");
        assert_eq!(failed.kind, WatchKind::Node);

        let succeeded = AllocatorEvent::cidr_assignment_succeeded("initial-cc", "node-1 allocated");
        assert_eq!(succeeded.reason, "CIDRAssignmentSucceeded");
        assert_eq!(succeeded.kind, WatchKind::ClusterCidr);
    }
}
