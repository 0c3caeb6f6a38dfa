//! The node → ClusterCIDR cascading sort. Label matching itself
//! lives in [`ccalloc_core::selector`]; this module only orders the entries
//! that already passed the label filter.

use crate::index::AllocatorEntry;
use std::cmp::Ordering;

/// Comparator for `Vec<&AllocatorEntry>::sort_by`, implementing the four
/// cascading keys in priority order: fewest free sub-prefixes, most specific
/// selector, smallest per-node mask (v4 then v6), lexicographic name.
pub fn compare_entries(a: &&AllocatorEntry, b: &&AllocatorEntry) -> Ordering {
    a.free()
        .cmp(&b.free())
        .then_with(|| specificity_key(b).cmp(&specificity_key(a)))
        .then_with(|| mask_rank(a.v4_node_prefix_len()).cmp(&mask_rank(b.v4_node_prefix_len())))
        .then_with(|| mask_rank(a.v6_node_prefix_len()).cmp(&mask_rank(b.v6_node_prefix_len())))
        .then_with(|| a.name.cmp(&b.name))
}

/// `(has_selector, match_expression_count)`, larger is more specific. A
/// non-nil selector always outranks no selector, regardless of its count.
fn specificity_key(entry: &AllocatorEntry) -> (bool, usize) {
    match &entry.spec.node_selector {
        Some(sel) => (true, sel.specificity()),
        None => (false, 0),
    }
}

/// Smaller rank sorts first. A longer (more specific) node prefix is a
/// "smaller" mask, so it is encoded as a more negative rank. Address
/// families the entry doesn't carry sort last.
fn mask_rank(prefix_len: Option<u8>) -> i16 {
    match prefix_len {
        Some(p) => -(p as i16),
        None => i16::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cidr_set::CidrSet;
    use ccalloc_core::{ClusterCidrSpec, NodeSelector, NodeSelectorOperator, NodeSelectorRequirement, NodeSelectorTerm};
    use std::collections::HashMap;

    fn entry(name: &str, ipv4: &str, per_node_host_bits: u8, selector: Option<NodeSelector>) -> AllocatorEntry {
        let v4_set = CidrSet::new(ipv4, per_node_host_bits).unwrap();
        AllocatorEntry {
            name: name.to_string(),
            spec: ClusterCidrSpec {
                per_node_host_bits: per_node_host_bits as i32,
                ipv4: Some(ipv4.to_string()),
                ipv6: None,
                node_selector: selector,
            },
            v4_set: Some(v4_set),
            v6_set: None,
            associated_nodes: HashMap::new(),
            terminating: false,
        }
    }

    fn in_term(key: &str) -> NodeSelectorTerm {
        NodeSelectorTerm {
            match_expressions: vec![NodeSelectorRequirement {
                key: key.to_string(),
                operator: NodeSelectorOperator::In,
                values: vec!["true".to_string()],
            }],
        }
    }

    #[test]
    fn fewest_free_wins_first() {
        let small = entry("small", "10.2.0.0/24", 4, None); // 16 sub-prefixes
        let large = entry("large", "10.0.0.0/16", 8, None); // 256 sub-prefixes
        let mut refs = vec![&large, &small];
        refs.sort_by(compare_entries);
        assert_eq!(refs[0].name, "small");
    }

    #[test]
    fn non_nil_selector_beats_no_selector_at_equal_free_count() {
        let plain = entry("plain", "10.0.0.0/24", 4, None);
        let selected = entry(
            "selected",
            "10.1.0.0/24",
            4,
            Some(NodeSelector {
                node_selector_terms: vec![in_term("bootstrap")],
            }),
        );
        let mut refs = vec![&plain, &selected];
        refs.sort_by(compare_entries);
        assert_eq!(refs[0].name, "selected");
    }

    #[test]
    fn smallest_mask_wins_when_free_and_specificity_tie() {
        // Both admit exactly 16 sub-prefixes, but "a"'s node mask is /24
        // (smaller block, more specific) while "b"'s is /20.
        let a = entry("a", "10.0.0.0/20", 8, None); // node mask /24, 16 free
        let b = entry("b", "10.0.0.0/16", 12, None); // node mask /20, 16 free
        let mut refs = vec![&b, &a];
        refs.sort_by(compare_entries);
        assert_eq!(refs[0].name, "a");
    }

    #[test]
    fn lexicographic_name_breaks_remaining_ties() {
        let b = entry("b-entry", "10.0.0.0/24", 4, None);
        let a = entry("a-entry", "10.1.0.0/24", 4, None);
        let mut refs = vec![&b, &a];
        refs.sort_by(compare_entries);
        assert_eq!(refs[0].name, "a-entry");
    }
}
