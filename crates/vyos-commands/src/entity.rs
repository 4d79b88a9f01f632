//! Device entities and batch generation

use crate::action::{Action, CommandBatch};
use crate::dhcp::{DhcpPool, StaticMapping};
use crate::error::CommandError;
use crate::firewall::{FirewallPolicy, FirewallRule, SubnetConnection, SubnetIsolation};
use crate::port_forward::PortForward;
use crate::route::StaticRoute;
use crate::vpn::VpnTunnel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command grammar of one entity kind
///
/// `disable_paths` lists the config paths whose `disable` node is toggled by
/// [`Action::Enable`] and [`Action::Disable`].
pub trait DeviceConfig {
    fn set_commands(&self) -> Result<Vec<String>, CommandError>;
    fn delete_commands(&self) -> Result<Vec<String>, CommandError>;
    fn disable_paths(&self) -> Result<Vec<String>, CommandError>;
}

/// Every entity kind the generator understands, each with its own field set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceEntity {
    /// Destination NAT port-forward rule
    PortForward(PortForward),
    /// DHCP server shared network
    DhcpPool(DhcpPool),
    /// DHCP static address mapping
    StaticMapping(StaticMapping),
    /// WireGuard interface with its peers
    VpnTunnel(VpnTunnel),
    /// Drop traffic from one subnet to others
    SubnetIsolation(SubnetIsolation),
    /// Allow traffic between two subnets
    SubnetConnection(SubnetConnection),
    /// Static route
    StaticRoute(StaticRoute),
    /// Named firewall ruleset
    FirewallPolicy(FirewallPolicy),
    /// One rule of a named firewall ruleset
    FirewallRule(FirewallRule),
}

/// Discriminant of [`DeviceEntity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Destination NAT port-forward rule
    PortForward,
    /// DHCP server shared network
    DhcpPool,
    /// DHCP static address mapping
    StaticMapping,
    /// WireGuard interface
    VpnTunnel,
    /// Subnet isolation policy
    SubnetIsolation,
    /// Inter-subnet connection rule
    SubnetConnection,
    /// Static route
    StaticRoute,
    /// Firewall ruleset
    FirewallPolicy,
    /// Firewall rule
    FirewallRule,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::PortForward => "port-forward",
            EntityKind::DhcpPool => "dhcp-pool",
            EntityKind::StaticMapping => "static-mapping",
            EntityKind::VpnTunnel => "vpn-tunnel",
            EntityKind::SubnetIsolation => "subnet-isolation",
            EntityKind::SubnetConnection => "subnet-connection",
            EntityKind::StaticRoute => "static-route",
            EntityKind::FirewallPolicy => "firewall-policy",
            EntityKind::FirewallRule => "firewall-rule",
        };
        f.write_str(name)
    }
}

impl DeviceEntity {
    /// Kind of this entity
    pub fn kind(&self) -> EntityKind {
        match self {
            DeviceEntity::PortForward(_) => EntityKind::PortForward,
            DeviceEntity::DhcpPool(_) => EntityKind::DhcpPool,
            DeviceEntity::StaticMapping(_) => EntityKind::StaticMapping,
            DeviceEntity::VpnTunnel(_) => EntityKind::VpnTunnel,
            DeviceEntity::SubnetIsolation(_) => EntityKind::SubnetIsolation,
            DeviceEntity::SubnetConnection(_) => EntityKind::SubnetConnection,
            DeviceEntity::StaticRoute(_) => EntityKind::StaticRoute,
            DeviceEntity::FirewallPolicy(_) => EntityKind::FirewallPolicy,
            DeviceEntity::FirewallRule(_) => EntityKind::FirewallRule,
        }
    }

    fn config(&self) -> &dyn DeviceConfig {
        match self {
            DeviceEntity::PortForward(e) => e,
            DeviceEntity::DhcpPool(e) => e,
            DeviceEntity::StaticMapping(e) => e,
            DeviceEntity::VpnTunnel(e) => e,
            DeviceEntity::SubnetIsolation(e) => e,
            DeviceEntity::SubnetConnection(e) => e,
            DeviceEntity::StaticRoute(e) => e,
            DeviceEntity::FirewallPolicy(e) => e,
            DeviceEntity::FirewallRule(e) => e,
        }
    }
}

/// Generate the ordered command batch for `action` on `entity`
pub fn generate(entity: &DeviceEntity, action: Action) -> Result<CommandBatch, CommandError> {
    let config = entity.config();
    let commands = match action {
        Action::Set => config.set_commands()?,
        Action::Delete => config.delete_commands()?,
        Action::Disable => config
            .disable_paths()?
            .into_iter()
            .map(|path| format!("set {} disable", path))
            .collect(),
        Action::Enable => config
            .disable_paths()?
            .into_iter()
            .map(|path| format!("delete {} disable", path))
            .collect(),
    };
    Ok(CommandBatch::new(action.op(), commands))
}
