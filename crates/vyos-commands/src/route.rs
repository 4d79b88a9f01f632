//! Static routes

use crate::entity::DeviceConfig;
use crate::error::CommandError;
use crate::syntax::{cidr, quote};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Static IPv4 route to a next hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticRoute {
    /// Destination prefix, CIDR
    pub destination: String,
    /// Next-hop gateway
    pub next_hop: Ipv4Addr,
    /// Administrative distance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<u8>,
    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StaticRoute {
    fn path(&self) -> Result<String, CommandError> {
        Ok(format!("protocols static route {}", cidr("destination", &self.destination)?))
    }
}

impl DeviceConfig for StaticRoute {
    fn set_commands(&self) -> Result<Vec<String>, CommandError> {
        let path = self.path()?;
        let mut commands = Vec::new();
        if let Some(description) = &self.description {
            commands.push(format!("set {} description {}", path, quote("description", description)?));
        }
        match self.distance {
            Some(distance) => commands.push(format!(
                "set {} next-hop {} distance '{}'",
                path, self.next_hop, distance
            )),
            None => commands.push(format!("set {} next-hop {}", path, self.next_hop)),
        }
        Ok(commands)
    }

    fn delete_commands(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![format!("delete {}", self.path()?)])
    }

    fn disable_paths(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![format!("{} next-hop {}", self.path()?, self.next_hop)])
    }
}
