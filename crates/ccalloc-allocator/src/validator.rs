//! ClusterCIDR spec validation, mirroring the create/update split
//! in the original apiserver's `ValidateClusterCIDR`/`ValidateClusterCIDRUpdate`.

use crate::cidr::{self, Family};
use ccalloc_core::{ClusterCidrSpec, CoreError};

const MIN_PER_NODE_HOST_BITS: i32 = 4;
const MAX_IPV6_NODE_PREFIX_LEN: u8 = 120;
const MAX_CAPACITY_EXPONENT: u8 = 16;

/// Create-time rules: at least one family set, each CIDR canonical,
/// `perNodeHostBits` in range, ipv6 node mask capped, capacity capped.
pub fn validate_create(spec: &ClusterCidrSpec) -> Result<(), CoreError> {
    if spec.ipv4.is_none() && spec.ipv6.is_none() {
        return Err(CoreError::invalid_spec(
            "at least one of spec.ipv4 or spec.ipv6 must be set",
            "set spec.ipv4 and/or spec.ipv6",
        ));
    }
    if spec.per_node_host_bits < MIN_PER_NODE_HOST_BITS {
        return Err(CoreError::invalid_spec(
            format!(
                "perNodeHostBits {} is below the minimum of {}",
                spec.per_node_host_bits, MIN_PER_NODE_HOST_BITS
            ),
            "increase perNodeHostBits",
        ));
    }

    if let Some(ipv4) = &spec.ipv4 {
        validate_family(ipv4, Family::V4, spec.per_node_host_bits)?;
    }
    if let Some(ipv6) = &spec.ipv6 {
        let node_prefix_len = validate_family(ipv6, Family::V6, spec.per_node_host_bits)?;
        if node_prefix_len > MAX_IPV6_NODE_PREFIX_LEN {
            return Err(CoreError::invalid_spec(
                format!(
                    "ipv6 node mask /{} exceeds the maximum of /{}",
                    node_prefix_len, MAX_IPV6_NODE_PREFIX_LEN
                ),
                "increase perNodeHostBits so the ipv6 node mask is /120 or shorter",
            ));
        }
    }
    Ok(())
}

/// Returns the computed node prefix length on success, for callers that need
/// it for a further family-specific check (ipv6's /120 cap).
fn validate_family(cidr_str: &str, expected: Family, per_node_host_bits: i32) -> Result<u8, CoreError> {
    let parsed = cidr::parse_cidr(cidr_str)?;
    if parsed.family != expected {
        return Err(CoreError::invalid_spec(
            format!("'{}' is not a valid {:?} CIDR", cidr_str, expected),
            "use an address of the matching family",
        ));
    }

    let width = parsed.family.width();
    if per_node_host_bits < 0 || per_node_host_bits as u8 >= width {
        return Err(CoreError::invalid_spec(
            format!(
                "perNodeHostBits {} is out of range for a {}-bit address",
                per_node_host_bits, width
            ),
            "perNodeHostBits must be between 4 and (address width - parent prefix length)",
        ));
    }

    let node_prefix_len = width - per_node_host_bits as u8;
    if node_prefix_len <= parsed.prefix_len {
        return Err(CoreError::invalid_spec(
            format!(
                "perNodeHostBits {} would make the node mask /{}, no narrower than the parent /{}",
                per_node_host_bits, node_prefix_len, parsed.prefix_len
            ),
            "reduce perNodeHostBits",
        ));
    }

    let capacity_exponent = node_prefix_len - parsed.prefix_len;
    if capacity_exponent > MAX_CAPACITY_EXPONENT {
        return Err(CoreError::invalid_spec(
            format!(
                "'{}' would admit 2^{} sub-prefixes, exceeding the {} cap",
                cidr_str,
                capacity_exponent,
                1u32 << MAX_CAPACITY_EXPONENT
            ),
            "increase perNodeHostBits or shrink the CIDR",
        ));
    }

    Ok(node_prefix_len)
}

/// Update-time rules: the spec is immutable once admitted. `metadata.name`
/// immutability is enforced by the caller, which never looks up an index
/// entry under a different name than the incoming object's.
pub fn validate_update(old: &ClusterCidrSpec, new: &ClusterCidrSpec) -> Result<(), CoreError> {
    if old != new {
        return Err(CoreError::spec_immutable("spec"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ipv4: Option<&str>, ipv6: Option<&str>, per_node_host_bits: i32) -> ClusterCidrSpec {
        ClusterCidrSpec {
            per_node_host_bits,
            ipv4: ipv4.map(str::to_string),
            ipv6: ipv6.map(str::to_string),
            node_selector: None,
        }
    }

    #[test]
    fn accepts_the_spec_default_dual_stack_pool() {
        validate_create(&spec(Some("10.96.0.0/12"), Some("fd00:10:96::/112"), 8)).unwrap();
    }

    #[test]
    fn rejects_missing_both_families() {
        assert!(validate_create(&spec(None, None, 8)).is_err());
    }

    #[test]
    fn rejects_per_node_host_bits_below_minimum() {
        assert!(validate_create(&spec(Some("10.0.0.0/16"), None, 2)).is_err());
    }

    #[test]
    fn rejects_per_node_host_bits_out_of_range() {
        assert!(validate_create(&spec(Some("10.0.0.0/16"), None, 100)).is_err());
    }

    #[test]
    fn rejects_ipv6_node_mask_narrower_than_slash_120() {
        // perNodeHostBits=4 on a /112 parent yields a /124 node mask, which
        // reserves fewer than the required 8 host bits per node.
        assert!(validate_create(&spec(None, Some("fd00:10:96::/112"), 4)).is_err());
        // perNodeHostBits=8 yields the conventional /120 mask and passes.
        assert!(validate_create(&spec(None, Some("fd00:10:96::/112"), 8)).is_ok());
    }

    #[test]
    fn rejects_family_mismatched_cidr_strings() {
        assert!(validate_create(&spec(Some("fd00::/112"), None, 8)).is_err());
    }

    #[test]
    fn rejects_capacity_above_65536() {
        assert!(validate_create(&spec(Some("10.0.0.0/8"), None, 1)).is_err());
    }

    #[test]
    fn update_rejects_changed_spec_and_allows_identical() {
        let a = spec(Some("10.0.0.0/16"), None, 8);
        let b = a.clone();
        validate_update(&a, &b).unwrap();
        let changed = spec(Some("10.0.0.0/16"), None, 12);
        assert!(validate_update(&a, &changed).is_err());
    }
}
