//! WireGuard tunnels

use crate::entity::DeviceConfig;
use crate::error::CommandError;
use crate::syntax::{cidr, ident, quote};
use serde::{Deserialize, Serialize};

/// WireGuard interface and its peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnTunnel {
    /// WireGuard interface name, `wg0` and up
    pub interface: String,
    /// Interface address, CIDR
    pub address: String,
    /// UDP listen port
    pub listen_port: u16,
    /// Interface private key
    pub private_key: String,
    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Peers set together with the interface
    #[serde(default)]
    pub peers: Vec<WireguardPeer>,
}

/// One WireGuard peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireguardPeer {
    /// Peer name under the interface
    pub name: String,
    /// Peer public key
    pub public_key: String,
    /// Prefixes routed to the peer, CIDR
    pub allowed_ips: Vec<String>,
    /// Peer's public address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_address: Option<String>,
    /// Peer's listen port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_port: Option<u16>,
    /// Keepalive interval in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
    /// Optional preshared key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<String>,
}

impl VpnTunnel {
    fn path(&self) -> Result<String, CommandError> {
        let interface = ident("interface", &self.interface)?;
        if !interface.starts_with("wg") {
            return Err(CommandError::InvalidValue {
                field: "interface",
                value: interface.to_string(),
            });
        }
        Ok(format!("interfaces wireguard {}", interface))
    }
}

impl DeviceConfig for VpnTunnel {
    fn set_commands(&self) -> Result<Vec<String>, CommandError> {
        let path = self.path()?;
        let mut commands = Vec::new();
        if let Some(description) = &self.description {
            commands.push(format!("set {} description {}", path, quote("description", description)?));
        }
        commands.push(format!("set {} address '{}'", path, cidr("address", &self.address)?));
        commands.push(format!("set {} port '{}'", path, self.listen_port));
        commands.push(format!("set {} private-key {}", path, quote("private_key", &self.private_key)?));

        for peer in &self.peers {
            let peer_path = format!("{} peer {}", path, ident("peer", &peer.name)?);
            commands.push(format!(
                "set {} public-key {}",
                peer_path,
                quote("public_key", &peer.public_key)?
            ));
            if peer.allowed_ips.is_empty() {
                return Err(CommandError::Empty { field: "allowed_ips" });
            }
            for allowed in &peer.allowed_ips {
                commands.push(format!("set {} allowed-ips '{}'", peer_path, cidr("allowed_ips", allowed)?));
            }
            if let Some(address) = &peer.endpoint_address {
                commands.push(format!("set {} address {}", peer_path, quote("endpoint_address", address)?));
            }
            if let Some(port) = peer.endpoint_port {
                commands.push(format!("set {} port '{}'", peer_path, port));
            }
            if let Some(keepalive) = peer.persistent_keepalive {
                commands.push(format!("set {} persistent-keepalive '{}'", peer_path, keepalive));
            }
            if let Some(psk) = &peer.preshared_key {
                commands.push(format!("set {} preshared-key {}", peer_path, quote("preshared_key", psk)?));
            }
        }
        Ok(commands)
    }

    fn delete_commands(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![format!("delete {}", self.path()?)])
    }

    fn disable_paths(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![self.path()?])
    }
}
