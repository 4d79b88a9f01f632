//! Inventory records

use allocator::AddressRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use uuid::Uuid;
use vyos_commands::{canonical_description, PortKind, Protocol};

/// Lifecycle of a port-forward row
///
/// `not_active` rows keep their external port and NAT rule number reserved
/// so the forward can be re-activated without renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    /// Forwarded and active on the device
    Enabled,
    /// Present on the device with its `disable` node set
    Disabled,
    /// Removed from the device; port and rule number stay reserved
    NotActive,
}

impl RuleStatus {
    /// Whether the device is expected to hold this rule
    pub fn is_declared(self) -> bool {
        matches!(self, RuleStatus::Enabled | RuleStatus::Disabled)
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleStatus::Enabled => "enabled",
            RuleStatus::Disabled => "disabled",
            RuleStatus::NotActive => "not_active",
        })
    }
}

/// A provisioned workload's network identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEndpoint {
    /// Row identifier
    pub id: Uuid,
    /// Caller-chosen machine identifier, unique
    pub machine_id: String,
    /// Hardware address, lower-cased, unique
    pub mac_address: String,
    /// Allocated internal address, unique when set
    pub internal_address: Option<Ipv4Addr>,
    /// Optional DNS name
    pub hostname: Option<String>,
    /// Pool the address was allocated from
    pub pool_id: Option<Uuid>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl NetworkEndpoint {
    /// New endpoint with a fresh id and no address
    pub fn new(machine_id: impl Into<String>, mac_address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            machine_id: machine_id.into(),
            mac_address: mac_address.into().to_ascii_lowercase(),
            internal_address: None,
            hostname: None,
            pool_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One forwarded service of one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardRule {
    /// Row identifier
    pub id: Uuid,
    /// Owning endpoint
    pub endpoint_id: Uuid,
    /// Forwarded service
    pub kind: PortKind,
    /// External port on the router, unique
    pub external_port: u16,
    /// NAT destination rule number on the router, unique
    pub nat_rule_number: u32,
    /// Transport protocol
    pub protocol: Protocol,
    /// Optional source address restriction
    pub source_address: Option<String>,
    /// Overrides the canonical `<machine_id> <KIND>` description
    pub description: Option<String>,
    /// Lifecycle state
    pub status: RuleStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl PortForwardRule {
    /// New enabled TCP rule with a fresh id
    pub fn new(endpoint_id: Uuid, kind: PortKind, external_port: u16, nat_rule_number: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            kind,
            external_port,
            nat_rule_number,
            protocol: Protocol::Tcp,
            source_address: None,
            description: None,
            status: RuleStatus::Enabled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Description the device rule carries
    pub fn description_for(&self, machine_id: &str) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| canonical_description(machine_id, &self.kind))
    }
}

/// Named internal address range endpoints can be provisioned from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPool {
    /// Pool identifier
    pub id: Uuid,
    /// Pool name, unique
    pub name: String,
    /// Host range of the pool
    pub range: AddressRange,
    /// Free-form note
    pub description: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl AddressPool {
    /// New pool with a fresh id
    pub fn new(name: impl Into<String>, range: AddressRange) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            range,
            description: None,
            created_at: Utc::now(),
        }
    }
}

/// Every value currently claimed, across all rows including `not_active`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedValues {
    /// Internal addresses
    pub addresses: BTreeSet<Ipv4Addr>,
    /// External ports
    pub ports: BTreeSet<u16>,
    /// NAT rule numbers
    pub nat_rules: BTreeSet<u32>,
}

/// A declared rule joined with its endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredRule {
    /// Owning endpoint
    pub endpoint: NetworkEndpoint,
    /// The rule itself
    pub rule: PortForwardRule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_defaults_to_canonical() {
        let mut rule = PortForwardRule::new(Uuid::new_v4(), PortKind::Ssh, 2201, 10001);
        assert_eq!(rule.description_for("vm1"), "vm1 SSH");
        rule.description = Some("bastion".to_string());
        assert_eq!(rule.description_for("vm1"), "bastion");
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&RuleStatus::NotActive).unwrap(), "\"not_active\"");
        assert!(RuleStatus::Disabled.is_declared());
        assert!(!RuleStatus::NotActive.is_declared());
    }

    #[test]
    fn test_endpoint_normalizes_mac() {
        let endpoint = NetworkEndpoint::new("vm1", "AA:BB:CC:DD:EE:FF");
        assert_eq!(endpoint.mac_address, "aa:bb:cc:dd:ee:ff");
    }
}
