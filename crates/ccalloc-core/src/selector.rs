//! Kubernetes-style `NodeSelector` evaluation against a Node's labels.
//!
//! A [`NodeSelector`] is an OR across [`NodeSelectorTerm`]s; each term is an
//! AND across [`NodeSelectorRequirement`]s. This mirrors
//! `k8s.io/api/core/v1.NodeSelector` closely enough to be admitted straight
//! from a `ClusterCIDR.spec.nodeSelector` payload, but is deliberately a
//! plain Rust type rather than pulled from k8s-openapi since that crate's
//! generated selector types carry no evaluation logic of their own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single label comparison within a [`NodeSelectorTerm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

impl NodeSelectorRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.operator {
            NodeSelectorOperator::Exists => labels.contains_key(&self.key),
            NodeSelectorOperator::DoesNotExist => !labels.contains_key(&self.key),
            NodeSelectorOperator::In => labels
                .get(&self.key)
                .is_some_and(|v| self.values.iter().any(|candidate| candidate == v)),
            NodeSelectorOperator::NotIn => !labels
                .get(&self.key)
                .is_some_and(|v| self.values.iter().any(|candidate| candidate == v)),
            NodeSelectorOperator::Gt => numeric_compare(labels, self, |a, b| a > b),
            NodeSelectorOperator::Lt => numeric_compare(labels, self, |a, b| a < b),
        }
    }
}

fn numeric_compare(
    labels: &BTreeMap<String, String>,
    req: &NodeSelectorRequirement,
    cmp: impl Fn(i64, i64) -> bool,
) -> bool {
    let Some(label_value) = labels.get(&req.key).and_then(|v| v.parse::<i64>().ok()) else {
        return false;
    };
    let Some(operand) = req.values.first().and_then(|v| v.parse::<i64>().ok()) else {
        return false;
    };
    cmp(label_value, operand)
}

/// AND of [`NodeSelectorRequirement`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeSelectorTerm {
    #[serde(default, rename = "matchExpressions")]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

impl NodeSelectorTerm {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_expressions.iter().all(|req| req.matches(labels))
    }
}

/// OR of [`NodeSelectorTerm`]s. `None` (absent on the ClusterCIDR) matches
/// every Node; an empty `node_selector_terms` list matches nothing, mirroring
/// upstream Kubernetes semantics for an explicitly-empty selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeSelector {
    #[serde(default, rename = "nodeSelectorTerms")]
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

impl NodeSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.node_selector_terms.iter().any(|term| term.matches(labels))
    }

    /// Total match-expression count, summed across terms. Used by the
    /// Selector's "most specific selector" tie-break.
    pub fn specificity(&self) -> usize {
        self.node_selector_terms
            .iter()
            .map(|term| term.match_expressions.len())
            .sum()
    }
}
