//! Range configuration
//!
//! Three independent ranges feed the allocator: the internal address pool,
//! the external port pool and the fixed NAT rule number pool.

use crate::error::AllocatorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// First NAT rule number handed out to port-forward rules
pub const NAT_RULE_BASE: u32 = 10_000;

/// Number of NAT rule numbers in the pool
pub const NAT_RULE_WIDTH: u32 = 10_000;

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// First value
    pub start: u32,
    /// Last value, inclusive
    pub end: u32,
}

impl Range {
    /// Create a range, rejecting `start > end`
    pub fn new(start: u32, end: u32) -> Result<Self, AllocatorError> {
        if start > end {
            return Err(AllocatorError::InvalidRange(format!(
                "start {} is greater than end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The NAT rule number pool: `10000..=19999`
    pub fn nat_rules() -> Self {
        Self {
            start: NAT_RULE_BASE,
            end: NAT_RULE_BASE + NAT_RULE_WIDTH - 1,
        }
    }

    /// Number of values in the range
    pub fn width(&self) -> u32 {
        self.end - self.start + 1
    }

    /// True when `value` lies within the range
    pub fn contains(&self, value: u32) -> bool {
        (self.start..=self.end).contains(&value)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Inclusive external port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// First port
    pub start: u16,
    /// Last port, inclusive
    pub end: u16,
}

impl PortRange {
    /// Create a port range, rejecting port 0 and `start > end`
    pub fn new(start: u16, end: u16) -> Result<Self, AllocatorError> {
        if start == 0 || start > end {
            return Err(AllocatorError::InvalidRange(format!(
                "invalid port range {}-{}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The same bounds as a numeric range
    pub fn as_range(&self) -> Range {
        Range {
            start: u32::from(self.start),
            end: u32::from(self.end),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Internal address pool: a /24 base prefix plus a host octet range
///
/// Only the first three octets of `base` are significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRange {
    /// Base prefix; the host octet is ignored
    pub base: Ipv4Addr,
    /// First host octet
    pub start_octet: u8,
    /// Last host octet, inclusive
    pub end_octet: u8,
}

impl AddressRange {
    /// Create an address range, rejecting `start_octet > end_octet`
    pub fn new(base: Ipv4Addr, start_octet: u8, end_octet: u8) -> Result<Self, AllocatorError> {
        if start_octet > end_octet {
            return Err(AllocatorError::InvalidRange(format!(
                "start octet {} is greater than end octet {}",
                start_octet, end_octet
            )));
        }
        let [a, b, c, _] = base.octets();
        Ok(Self {
            base: Ipv4Addr::new(a, b, c, 0),
            start_octet,
            end_octet,
        })
    }

    /// Address for a host octet under this range's base
    pub fn address(&self, octet: u8) -> Ipv4Addr {
        let [a, b, c, _] = self.base.octets();
        Ipv4Addr::new(a, b, c, octet)
    }

    /// True when `addr` shares the base prefix and its host octet is in range
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let [a, b, c, host] = addr.octets();
        let [ba, bb, bc, _] = self.base.octets();
        (a, b, c) == (ba, bb, bc) && (self.start_octet..=self.end_octet).contains(&host)
    }

    /// Apply the address bounds of a per-call override
    pub fn with_override(&self, over: &RangeOverride) -> Result<Self, AllocatorError> {
        Self::new(
            over.address_base.unwrap_or(self.base),
            over.address_start.unwrap_or(self.start_octet),
            over.address_end.unwrap_or(self.end_octet),
        )
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.address(self.start_octet), self.address(self.end_octet))
    }
}

/// Per-request range override
///
/// Any bound left unset falls back to the configured range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeOverride {
    /// Replaces the configured base prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_base: Option<Ipv4Addr>,
    /// Replaces the first host octet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_start: Option<u8>,
    /// Replaces the last host octet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_end: Option<u8>,
    /// Replaces the first external port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_start: Option<u16>,
    /// Replaces the last external port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_end: Option<u16>,
}

/// The configured allocation ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeConfig {
    /// Internal address pool
    pub addresses: AddressRange,
    /// External port pool
    pub ports: PortRange,
}

impl RangeConfig {
    /// NAT rule numbers always come from the fixed pool
    pub fn nat_rules(&self) -> Range {
        Range::nat_rules()
    }

    /// Ranges for one call, with `over` applied when present
    pub fn resolve(&self, over: Option<&RangeOverride>) -> Result<Self, AllocatorError> {
        let Some(over) = over else {
            return Ok(*self);
        };
        Ok(Self {
            addresses: self.addresses.with_override(over)?,
            ports: PortRange::new(
                over.port_start.unwrap_or(self.ports.start),
                over.port_end.unwrap_or(self.ports.end),
            )?,
        })
    }
}
