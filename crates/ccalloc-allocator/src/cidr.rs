//! Dual-stack CIDR parsing and index arithmetic for [`crate::cidr_set::CidrSet`].
//!
//! Addresses are widened to `u128` regardless of family so that v4 and v6
//! share one bit-shifting implementation; the family is tracked alongside so
//! the value can be rendered back into the right textual form.

use ccalloc_core::CoreError;
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Address width in bits for this family.
    pub fn width(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }
}

/// A parsed `address/prefix_len` pair, widened to `u128`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCidr {
    pub family: Family,
    pub network: u128,
    pub prefix_len: u8,
}

impl ParsedCidr {
    pub fn to_cidr_string(self) -> String {
        match self.family {
            Family::V4 => {
                let addr = Ipv4Addr::from(self.network as u32);
                format!("{}/{}", addr, self.prefix_len)
            }
            Family::V6 => {
                let addr = Ipv6Addr::from(self.network);
                format!("{}/{}", addr, self.prefix_len)
            }
        }
    }
}

/// Parse a CIDR string like `"10.0.0.0/16"` or `"fd00:10:96::/112"`.
///
/// Rejects strings whose host bits are non-zero: every stored ClusterCIDR
/// must be in canonical network form.
pub fn parse_cidr(cidr_str: &str) -> Result<ParsedCidr, CoreError> {
    let (addr_part, prefix_part) = cidr_str
        .split_once('/')
        .ok_or_else(|| CoreError::invalid_cidr(cidr_str, "expected '<address>/<prefix-len>'"))?;

    if let Ok(v4) = addr_part.parse::<Ipv4Addr>() {
        let prefix_len: u8 = prefix_part
            .parse()
            .map_err(|_| CoreError::invalid_cidr(cidr_str, "prefix length is not a number"))?;
        if prefix_len > 32 {
            return Err(CoreError::invalid_cidr(
                cidr_str,
                "IPv4 prefix length must be 0-32",
            ));
        }
        let network = u32::from(v4) as u128;
        check_canonical(cidr_str, network, prefix_len, 32)?;
        return Ok(ParsedCidr {
            family: Family::V4,
            network,
            prefix_len,
        });
    }

    if let Ok(v6) = addr_part.parse::<Ipv6Addr>() {
        let prefix_len: u8 = prefix_part
            .parse()
            .map_err(|_| CoreError::invalid_cidr(cidr_str, "prefix length is not a number"))?;
        if prefix_len > 128 {
            return Err(CoreError::invalid_cidr(
                cidr_str,
                "IPv6 prefix length must be 0-128",
            ));
        }
        let network = u128::from(v6);
        check_canonical(cidr_str, network, prefix_len, 128)?;
        return Ok(ParsedCidr {
            family: Family::V6,
            network,
            prefix_len,
        });
    }

    Err(CoreError::invalid_cidr(cidr_str, "not a valid IPv4 or IPv6 address"))
}

fn check_canonical(cidr_str: &str, network: u128, prefix_len: u8, width: u8) -> Result<(), CoreError> {
    let host_bits = width - prefix_len;
    let host_mask = if host_bits == 0 { 0 } else { (1u128 << host_bits) - 1 };
    if network & host_mask != 0 {
        return Err(CoreError::invalid_cidr(
            cidr_str,
            "host bits must be zero (not in canonical network form)",
        ));
    }
    Ok(())
}

/// Compute the address of sub-prefix `index` within a parent CIDR, given the
/// number of host bits reserved per node.
pub fn sub_prefix_address(parent_network: u128, per_node_host_bits: u8, index: u64) -> u128 {
    parent_network | ((index as u128) << per_node_host_bits)
}

/// Compute the `[begin, end)` index range a CIDR covers within a CIDRSet.
/// The CIDR may be larger, smaller, or equal to the node mask. Returns
/// `None` if `cidr` does not intersect the parent range.
pub fn index_range(
    parent: &ParsedCidr,
    node_prefix_len: u8,
    per_node_host_bits: u8,
    max_cidrs: u64,
    cidr: &ParsedCidr,
) -> Option<(u64, u64)> {
    if cidr.family != parent.family {
        return None;
    }

    // `cidr` must lie within the parent's address range.
    let parent_host_bits = parent.family.width() - parent.prefix_len;
    let parent_span = if parent_host_bits == 0 {
        1u128
    } else {
        1u128 << parent_host_bits
    };
    let parent_end = parent.network + parent_span;
    if cidr.network < parent.network {
        return None;
    }
    // A cidr larger than the parent (smaller prefix_len) can't intersect
    // unless it's identical; reject anything not fully contained.
    let cidr_host_bits = cidr.family.width() - cidr.prefix_len;
    let cidr_span = if cidr_host_bits == 0 { 1u128 } else { 1u128 << cidr_host_bits };
    if cidr.network + cidr_span > parent_end {
        return None;
    }

    let offset = cidr.network - parent.network;
    let begin = (offset >> per_node_host_bits) as u64;

    let exponent = node_prefix_len as i32 - cidr.prefix_len as i32;
    let count: u64 = if exponent > 0 { 1u64 << exponent } else { 1 };
    let end = begin + count;

    if begin >= max_cidrs || end > max_cidrs {
        return None;
    }
    Some((begin, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v4_and_v6() {
        let v4 = parse_cidr("10.0.0.0/16").unwrap();
        assert_eq!(v4.family, Family::V4);
        assert_eq!(v4.prefix_len, 16);

        let v6 = parse_cidr("fd00:10:96::/112").unwrap();
        assert_eq!(v6.family, Family::V6);
        assert_eq!(v6.prefix_len, 112);
    }

    #[test]
    fn rejects_non_canonical_host_bits() {
        let err = parse_cidr("10.0.0.1/16").unwrap_err();
        assert!(matches!(err, CoreError::InvalidCidr { .. }));
    }

    #[test]
    fn round_trips_to_string() {
        let parsed = parse_cidr("10.0.0.0/24").unwrap();
        assert_eq!(parsed.to_cidr_string(), "10.0.0.0/24");
    }

    #[test]
    fn sub_prefix_address_shifts_into_place() {
        let parent = parse_cidr("10.2.0.0/16").unwrap();
        // per_node_host_bits = 8 => node prefix /24
        let addr = sub_prefix_address(parent.network, 8, 1);
        assert_eq!(Ipv4Addr::from(addr as u32), "10.2.1.0".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn index_range_for_exact_node_size_cidr() {
        let parent = parse_cidr("10.2.0.0/16").unwrap();
        let node_prefix_len = 24;
        let max_cidrs = 1u64 << (node_prefix_len - parent.prefix_len);
        let target = parse_cidr("10.2.1.0/24").unwrap();
        let (begin, end) = index_range(&parent, node_prefix_len, 8, max_cidrs, &target).unwrap();
        assert_eq!((begin, end), (1, 2));
    }

    #[test]
    fn index_range_for_wider_cidr_covers_multiple_indices() {
        let parent = parse_cidr("10.0.0.0/16").unwrap();
        let node_prefix_len = 24;
        let max_cidrs = 1u64 << (node_prefix_len - parent.prefix_len);
        // A /20 occupies 16 contiguous /24s.
        let wide = parse_cidr("10.0.0.0/20").unwrap();
        let (begin, end) = index_range(&parent, node_prefix_len, 8, max_cidrs, &wide).unwrap();
        assert_eq!((begin, end), (0, 16));
    }

    #[test]
    fn index_range_rejects_cidr_outside_parent() {
        let parent = parse_cidr("10.0.0.0/16").unwrap();
        let node_prefix_len = 24;
        let max_cidrs = 1u64 << (node_prefix_len - parent.prefix_len);
        let outside = parse_cidr("192.168.0.0/24").unwrap();
        assert!(index_range(&parent, node_prefix_len, 8, max_cidrs, &outside).is_none());
    }
}
