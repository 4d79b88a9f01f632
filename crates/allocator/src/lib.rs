//! Resource allocation
//!
//! Hands out scarce numeric resources (internal addresses, external ports,
//! NAT rule numbers) by picking the lowest value of a configured range that
//! is not already in use.
//!
//! Allocation is deterministic and side-effect free. Callers read the set of
//! used values from the store immediately before calling and persist the claim
//! immediately after, ideally inside one storage transaction with a uniqueness
//! constraint on the claimed column as a backstop.
//!
//! # Example
//!
//! ```
//! use allocator::{allocate, Range};
//! use std::collections::BTreeSet;
//!
//! let range = Range::new(100, 102).unwrap();
//! let used: BTreeSet<u32> = [100].into_iter().collect();
//! assert_eq!(allocate(&range, &used).unwrap(), 101);
//! ```

pub mod error;
pub mod range;

pub use error::AllocatorError;
pub use range::*;

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Returns the lowest value of `range` (inclusive) that is not in `used`.
pub fn allocate(range: &Range, used: &BTreeSet<u32>) -> Result<u32, AllocatorError> {
    (range.start..=range.end)
        .find(|candidate| !used.contains(candidate))
        .ok_or(AllocatorError::Exhausted { range: range.to_string() })
}

/// Allocates an internal address from `range`.
///
/// The value space is `base.a.b.c + octet` for every host octet in the range,
/// so only addresses sharing the base's first three octets are considered used.
pub fn allocate_address(
    range: &AddressRange,
    used: &BTreeSet<Ipv4Addr>,
) -> Result<Ipv4Addr, AllocatorError> {
    let used_octets: BTreeSet<u32> = used
        .iter()
        .filter(|addr| range.contains(**addr))
        .map(|addr| u32::from(addr.octets()[3]))
        .collect();

    let octets = Range::new(u32::from(range.start_octet), u32::from(range.end_octet))?;
    let octet = allocate(&octets, &used_octets).map_err(|_| AllocatorError::Exhausted {
        range: range.to_string(),
    })?;

    // The octet range is bounded by u8 inputs, so the conversion cannot fail.
    let octet = u8::try_from(octet).map_err(|_| AllocatorError::Exhausted {
        range: range.to_string(),
    })?;
    Ok(range.address(octet))
}

/// Allocates an external port from `range`.
pub fn allocate_port(range: &PortRange, used: &BTreeSet<u16>) -> Result<u16, AllocatorError> {
    let used: BTreeSet<u32> = used.iter().map(|p| u32::from(*p)).collect();
    let port = allocate(&range.as_range(), &used)?;
    u16::try_from(port).map_err(|_| AllocatorError::Exhausted { range: range.to_string() })
}

/// Allocates a NAT rule number from the fixed rule pool.
pub fn allocate_nat_rule(used: &BTreeSet<u32>) -> Result<u32, AllocatorError> {
    allocate(&Range::nat_rules(), used)
}
