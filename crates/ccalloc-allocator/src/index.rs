//! ClusterCIDRIndex: AllocatorEntries keyed by name, with
//! candidate lookup in cascading selection order.

use crate::cidr_set::CidrSet;
use crate::error::{AllocatorError, Result};
use crate::selector;
use ccalloc_core::{ClusterCidr, ClusterCidrSpec};
use std::collections::{BTreeMap, HashMap};

/// One admitted ClusterCIDR's live allocation state.
pub struct AllocatorEntry {
    pub name: String,
    pub spec: ClusterCidrSpec,
    pub v4_set: Option<CidrSet>,
    pub v6_set: Option<CidrSet>,
    /// Node name -> the pod CIDRs it was allocated from this entry.
    pub associated_nodes: HashMap<String, Vec<String>>,
    pub terminating: bool,
}

impl AllocatorEntry {
    /// `min(v4Set.free, v6Set.free)` for a dual-stack entry; the sole side's
    /// free count for a single-stack one.
    pub fn free(&self) -> u64 {
        match (&self.v4_set, &self.v6_set) {
            (Some(v4), Some(v6)) => v4.free().min(v6.free()),
            (Some(v4), None) => v4.free(),
            (None, Some(v6)) => v6.free(),
            (None, None) => 0,
        }
    }

    pub fn v4_node_prefix_len(&self) -> Option<u8> {
        self.v4_set.as_ref().map(|s| s.node_prefix_len())
    }

    pub fn v6_node_prefix_len(&self) -> Option<u8> {
        self.v6_set.as_ref().map(|s| s.node_prefix_len())
    }

    pub fn contains(&self, cidr: &str) -> bool {
        self.v4_set.as_ref().is_some_and(|s| s.contains(cidr))
            || self.v6_set.as_ref().is_some_and(|s| s.contains(cidr))
    }

    pub fn record_node(&mut self, node_name: impl Into<String>, cidrs: Vec<String>) {
        self.associated_nodes.insert(node_name.into(), cidrs);
    }

    /// Release every sub-prefix recorded for `node_name` and drop it from
    /// `associated_nodes`. Returns whether the node was actually associated.
    pub fn release_node(&mut self, node_name: &str) -> bool {
        let Some(cidrs) = self.associated_nodes.remove(node_name) else {
            return false;
        };
        for cidr in cidrs {
            let set = if cidr.contains(':') {
                self.v6_set.as_mut()
            } else {
                self.v4_set.as_mut()
            };
            if let Some(set) = set {
                let _ = set.release(&cidr);
            }
        }
        true
    }
}

/// Holds every admitted ClusterCIDR's state, keyed by name.
pub struct ClusterCidrIndex {
    entries: HashMap<String, AllocatorEntry>,
}

impl Default for ClusterCidrIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterCidrIndex {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Validate, construct CIDRSets and insert. If `cc.name` is already
    /// present, verifies the spec is unchanged instead of re-admitting.
    pub fn admit(&mut self, cc: &ClusterCidr) -> Result<()> {
        if let Some(existing) = self.entries.get(&cc.name) {
            if existing.spec != cc.spec {
                return Err(AllocatorError::spec_immutable(cc.name.clone()));
            }
            return Ok(());
        }

        let per_node_host_bits = cc.spec.per_node_host_bits as u8;
        let v4_set = cc
            .spec
            .ipv4
            .as_ref()
            .map(|parent| CidrSet::new(parent, per_node_host_bits))
            .transpose()?;
        let v6_set = cc
            .spec
            .ipv6
            .as_ref()
            .map(|parent| CidrSet::new(parent, per_node_host_bits))
            .transpose()?;

        self.entries.insert(
            cc.name.clone(),
            AllocatorEntry {
                name: cc.name.clone(),
                spec: cc.spec.clone(),
                v4_set,
                v6_set,
                associated_nodes: HashMap::new(),
                terminating: cc.is_terminating(),
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&AllocatorEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AllocatorEntry> {
        self.entries.get_mut(name)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AllocatorEntry> {
        self.entries.values_mut()
    }

    /// Remove `name`; refuses while it still has associated nodes.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        if let Some(entry) = self.entries.get(name) {
            if !entry.associated_nodes.is_empty() {
                return Err(AllocatorError::entry_in_use(
                    name.to_string(),
                    entry.associated_nodes.len(),
                ));
            }
        }
        self.entries.remove(name);
        Ok(())
    }

    /// Names of non-terminating entries whose selector matches `labels`,
    /// in cascading selection order.
    pub fn candidate_names(&self, labels: &BTreeMap<String, String>) -> Vec<String> {
        let mut matches: Vec<&AllocatorEntry> = self
            .entries
            .values()
            .filter(|e| !e.terminating)
            .filter(|e| e.spec.node_selector.as_ref().is_none_or(|sel| sel.matches(labels)))
            .collect();
        matches.sort_by(selector::compare_entries);
        matches.into_iter().map(|e| e.name.clone()).collect()
    }

    /// Names of entries whose parent CIDR(s) contain `cidr`, ordered per
    /// the same cascading order used by occupancy reconciliation.
    pub fn names_containing(&self, cidr: &str) -> Vec<String> {
        let mut matches: Vec<&AllocatorEntry> = self.entries.values().filter(|e| e.contains(cidr)).collect();
        matches.sort_by(selector::compare_entries);
        matches.into_iter().map(|e| e.name.clone()).collect()
    }

    /// The entry that currently lists `node_name` in `associated_nodes`, if
    /// any (backs `Allocator::allocated_cluster_cidr`).
    pub fn entry_for_node(&self, node_name: &str) -> Option<String> {
        self.entries
            .values()
            .find(|e| e.associated_nodes.contains_key(node_name))
            .map(|e| e.name.clone())
    }
}
