//! IPv4 CIDR arithmetic for the mesh address plan.
//!
//! Node addresses start at `base + 1`, client addresses at `base + 101`,
//! assigned positionally. Prefixes outside `[8, 30]` are rejected: /31 and
//! /32 leave no room for hosts, anything wider than /8 is a typo.

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{Result, WireError};

/// First host offset handed to nodes.
pub const NODE_OFFSET: u32 = 1;

/// First host offset handed to clients.
pub const CLIENT_OFFSET: u32 = 101;

/// A parsed IPv4 network with positional address assignment.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CidrPlan {
    base: u32,
    prefix: u8,
}

impl CidrPlan {
    /// Parses `A.B.C.D/p` notation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCidr` when an octet is non-numeric or out of range,
    /// or the prefix is outside `[8, 30]`.
    pub fn parse(cidr: &str) -> Result<Self> {
        let (addr, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| WireError::InvalidCidr(format!("missing prefix in {cidr:?}")))?;

        let prefix: u8 = prefix
            .parse()
            .map_err(|_| WireError::InvalidCidr(format!("non-numeric prefix in {cidr:?}")))?;
        if !(8..=30).contains(&prefix) {
            return Err(WireError::InvalidCidr(format!(
                "prefix /{prefix} outside supported range [8, 30]"
            )));
        }

        let octets: Vec<&str> = addr.split('.').collect();
        if octets.len() != 4 {
            return Err(WireError::InvalidCidr(format!(
                "expected 4 octets in {cidr:?}"
            )));
        }
        let mut base: u32 = 0;
        for octet in octets {
            let value: u8 = octet.parse().map_err(|_| {
                WireError::InvalidCidr(format!("bad octet {octet:?} in {cidr:?}"))
            })?;
            base = (base << 8) | u32::from(value);
        }

        // Normalise to the network address.
        let mask = u32::MAX << (32 - u32::from(prefix));
        Ok(Self {
            base: base & mask,
            prefix,
        })
    }

    /// The network base address as an integer.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// The prefix length.
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the network (`2^(32-prefix)`).
    #[must_use]
    pub const fn size(&self) -> u32 {
        1 << (32 - self.prefix as u32)
    }

    /// The last address in the network.
    #[must_use]
    pub const fn last(&self) -> u32 {
        self.base + self.size() - 1
    }

    /// The address at `base + offset`, failing past the end of the network.
    ///
    /// # Errors
    ///
    /// Returns `AddressOutOfRange` when the offset runs past [`Self::last`].
    pub fn address_at(&self, offset: u32) -> Result<Ipv4Addr> {
        let candidate = self.base.checked_add(offset).ok_or_else(|| {
            WireError::AddressOutOfRange {
                offset,
                cidr: self.to_string(),
            }
        })?;
        if candidate > self.last() {
            return Err(WireError::AddressOutOfRange {
                offset,
                cidr: self.to_string(),
            });
        }
        Ok(Ipv4Addr::from(candidate))
    }

    /// The i-th node address (`base + 1 + i`).
    ///
    /// # Errors
    ///
    /// Returns `AddressOutOfRange` past the end of the network.
    pub fn node_address(&self, index: u32) -> Result<Ipv4Addr> {
        self.address_at(NODE_OFFSET + index)
    }

    /// The i-th client address (`base + 101 + i`).
    ///
    /// # Errors
    ///
    /// Returns `AddressOutOfRange` past the end of the network.
    pub fn client_address(&self, index: u32) -> Result<Ipv4Addr> {
        self.address_at(CLIENT_OFFSET + index)
    }
}

impl fmt::Display for CidrPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.base), self.prefix)
    }
}

impl fmt::Debug for CidrPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CidrPlan({self})")
    }
}

/// Renders a `u32` as dotted-quad notation.
#[must_use]
pub fn int_to_dotted(value: u32) -> String {
    Ipv4Addr::from(value).to_string()
}

/// Parses dotted-quad notation into a `u32`.
///
/// # Errors
///
/// Returns `InvalidCidr` when the input is not a valid IPv4 address.
pub fn dotted_to_int(addr: &str) -> Result<u32> {
    let parsed: Ipv4Addr = addr
        .parse()
        .map_err(|_| WireError::InvalidCidr(format!("bad address {addr:?}")))?;
    Ok(u32::from(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_network() {
        let plan = CidrPlan::parse("10.20.0.0/24").expect("valid cidr");
        assert_eq!(plan.base(), u32::from(Ipv4Addr::new(10, 20, 0, 0)));
        assert_eq!(plan.prefix(), 24);
        assert_eq!(plan.size(), 256);
        assert_eq!(plan.last(), u32::from(Ipv4Addr::new(10, 20, 0, 255)));
    }

    #[test]
    fn parse_normalises_host_bits() {
        let plan = CidrPlan::parse("10.20.0.77/24").expect("valid cidr");
        assert_eq!(plan.to_string(), "10.20.0.0/24");
    }

    #[test]
    fn parse_rejects_bad_octets() {
        assert!(CidrPlan::parse("10.20.0.x/24").is_err());
        assert!(CidrPlan::parse("10.300.0.0/24").is_err());
        assert!(CidrPlan::parse("10.20.0/24").is_err());
        assert!(CidrPlan::parse("10.20.0.0.1/24").is_err());
    }

    #[test]
    fn parse_rejects_prefix_range() {
        assert!(CidrPlan::parse("10.0.0.0/7").is_err());
        assert!(CidrPlan::parse("10.0.0.0/31").is_err());
        assert!(CidrPlan::parse("10.0.0.0/32").is_err());
        assert!(CidrPlan::parse("10.0.0.0/abc").is_err());
        assert!(CidrPlan::parse("10.0.0.0").is_err());
        assert!(CidrPlan::parse("10.0.0.0/8").is_ok());
        assert!(CidrPlan::parse("10.0.0.0/30").is_ok());
    }

    #[test]
    fn node_and_client_addresses() {
        let plan = CidrPlan::parse("10.20.0.0/24").expect("valid cidr");
        assert_eq!(
            plan.node_address(0).expect("node 0"),
            Ipv4Addr::new(10, 20, 0, 1)
        );
        assert_eq!(
            plan.node_address(2).expect("node 2"),
            Ipv4Addr::new(10, 20, 0, 3)
        );
        assert_eq!(
            plan.client_address(0).expect("client 0"),
            Ipv4Addr::new(10, 20, 0, 101)
        );
    }

    #[test]
    fn slash_30_has_room_for_one_node() {
        let plan = CidrPlan::parse("192.168.7.0/30").expect("valid cidr");
        assert_eq!(plan.size(), 4);
        assert!(plan.node_address(0).is_ok());
        assert!(plan.node_address(3).is_err());
        assert!(plan.client_address(0).is_err());
    }

    #[test]
    fn dotted_conversions_roundtrip() {
        let value = dotted_to_int("10.20.0.5").expect("parse");
        assert_eq!(int_to_dotted(value), "10.20.0.5");
        assert!(dotted_to_int("10.20.0").is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn dotted_roundtrip(value: u32) {
                let dotted = int_to_dotted(value);
                prop_assert_eq!(dotted_to_int(&dotted).unwrap(), value);
            }

            #[test]
            fn addresses_stay_in_network(prefix in 8u8..=30, index in 0u32..64) {
                let plan = CidrPlan::parse(&format!("10.0.0.0/{prefix}")).unwrap();
                if let Ok(addr) = plan.node_address(index) {
                    let v = u32::from(addr);
                    prop_assert!(v > plan.base());
                    prop_assert!(v <= plan.last());
                }
            }
        }
    }
}
