//! DHCP server pools and static address mappings

use crate::entity::DeviceConfig;
use crate::error::CommandError;
use crate::syntax::{cidr, ident, quote};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A DHCP shared network with one subnet and one dynamic range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhcpPool {
    /// Shared network name
    pub network_name: String,
    /// Served subnet, CIDR
    pub subnet: String,
    /// Numeric subnet id
    pub subnet_id: u32,
    /// First leased address
    pub range_start: Ipv4Addr,
    /// Last leased address
    pub range_stop: Ipv4Addr,
    /// Default gateway handed to clients
    pub default_router: Ipv4Addr,
    /// DNS servers handed to clients
    #[serde(default)]
    pub name_servers: Vec<Ipv4Addr>,
    /// Domain handed to clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    /// Lease time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_seconds: Option<u32>,
}

fn network_path(network_name: &str) -> Result<String, CommandError> {
    Ok(format!(
        "service dhcp-server shared-network-name {}",
        ident("network_name", network_name)?
    ))
}

fn subnet_path(network_name: &str, subnet: &str) -> Result<String, CommandError> {
    Ok(format!("{} subnet {}", network_path(network_name)?, cidr("subnet", subnet)?))
}

impl DeviceConfig for DhcpPool {
    fn set_commands(&self) -> Result<Vec<String>, CommandError> {
        if u32::from(self.range_start) > u32::from(self.range_stop) {
            return Err(CommandError::InvalidValue {
                field: "range_stop",
                value: self.range_stop.to_string(),
            });
        }

        let path = subnet_path(&self.network_name, &self.subnet)?;
        let mut commands = vec![
            format!("set {} subnet-id '{}'", path, self.subnet_id),
            format!("set {} option default-router '{}'", path, self.default_router),
        ];
        for server in &self.name_servers {
            commands.push(format!("set {} option name-server '{}'", path, server));
        }
        if let Some(domain) = &self.domain_name {
            commands.push(format!("set {} option domain-name {}", path, quote("domain_name", domain)?));
        }
        if let Some(lease) = self.lease_seconds {
            commands.push(format!("set {} lease '{}'", path, lease));
        }
        commands.push(format!("set {} range 0 start '{}'", path, self.range_start));
        commands.push(format!("set {} range 0 stop '{}'", path, self.range_stop));
        Ok(commands)
    }

    fn delete_commands(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![format!("delete {}", network_path(&self.network_name)?)])
    }

    fn disable_paths(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![network_path(&self.network_name)?])
    }
}

/// Fixed address for one hardware address inside a DHCP subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticMapping {
    /// Shared network name
    pub network_name: String,
    /// Subnet the mapping lives in, CIDR
    pub subnet: String,
    /// Mapping name
    pub name: String,
    /// Client hardware address
    pub mac_address: String,
    /// Address given to the client
    pub ip_address: Ipv4Addr,
}

impl StaticMapping {
    fn path(&self) -> Result<String, CommandError> {
        Ok(format!(
            "{} static-mapping {}",
            subnet_path(&self.network_name, &self.subnet)?,
            ident("name", &self.name)?
        ))
    }
}

/// Check `aa:bb:cc:dd:ee:ff` form
pub fn validate_mac(value: &str) -> Result<&str, CommandError> {
    let groups: Vec<&str> = value.split(':').collect();
    let valid = groups.len() == 6
        && groups
            .iter()
            .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(value)
    } else {
        Err(CommandError::InvalidValue {
            field: "mac_address",
            value: value.to_string(),
        })
    }
}

impl DeviceConfig for StaticMapping {
    fn set_commands(&self) -> Result<Vec<String>, CommandError> {
        let path = self.path()?;
        Ok(vec![
            format!("set {} mac '{}'", path, validate_mac(&self.mac_address)?.to_ascii_lowercase()),
            format!("set {} ip-address '{}'", path, self.ip_address),
        ])
    }

    fn delete_commands(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![format!("delete {}", self.path()?)])
    }

    fn disable_paths(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![self.path()?])
    }
}
