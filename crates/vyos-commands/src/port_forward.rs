//! Destination NAT (port-forward) rules

use crate::entity::DeviceConfig;
use crate::error::CommandError;
use crate::syntax::{address_or_cidr, ident, quote};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Named service category forwarded per endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// Secure shell
    Ssh,
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    Https,
    /// Remote desktop
    Rdp,
}

impl PortKind {
    /// Every kind, in display order
    pub const ALL: [PortKind; 4] = [PortKind::Ssh, PortKind::Http, PortKind::Https, PortKind::Rdp];

    /// Lower-case wire name
    pub fn as_str(self) -> &'static str {
        match self {
            PortKind::Ssh => "ssh",
            PortKind::Http => "http",
            PortKind::Https => "https",
            PortKind::Rdp => "rdp",
        }
    }

    /// Upper-case label used in rule descriptions and reports
    pub fn label(self) -> &'static str {
        match self {
            PortKind::Ssh => "SSH",
            PortKind::Http => "HTTP",
            PortKind::Https => "HTTPS",
            PortKind::Rdp => "RDP",
        }
    }

    /// Port on the endpoint that traffic is translated to
    pub fn translation_port(self) -> u16 {
        match self {
            PortKind::Ssh => 22,
            PortKind::Http => 80,
            PortKind::Https => 443,
            PortKind::Rdp => 3389,
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PortKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown port kind: {}", s))
    }
}

/// Transport protocol matched by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// TCP only
    #[default]
    Tcp,
    /// UDP only
    Udp,
    /// Both TCP and UDP
    TcpUdp,
}

impl Protocol {
    /// CLI keyword
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::TcpUdp => "tcp_udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "tcp_udp" => Ok(Protocol::TcpUdp),
            other => Err(format!("unknown protocol: {}", other)),
        }
    }
}

/// One destination NAT rule as written to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForward {
    /// NAT destination rule number
    pub rule_number: u32,
    /// Rule description, canonical or custom
    pub description: String,
    /// Interface the forward listens on
    pub inbound_interface: String,
    /// External destination port
    pub external_port: u16,
    /// Transport protocol
    pub protocol: Protocol,
    /// Only forward traffic from this address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    /// Internal address traffic is sent to
    pub translation_address: Ipv4Addr,
    /// Internal port traffic is sent to
    pub translation_port: u16,
    /// Write the rule with its `disable` node
    #[serde(default)]
    pub disabled: bool,
}

/// Config path of a NAT rule
pub fn rule_path(rule_number: u32) -> String {
    format!("nat destination rule {}", rule_number)
}

/// Delete batch for a rule known only by its number
pub fn delete_rule(rule_number: u32) -> crate::CommandBatch {
    crate::CommandBatch::new(
        crate::Op::Delete,
        vec![format!("delete {}", rule_path(rule_number))],
    )
}

impl DeviceConfig for PortForward {
    fn set_commands(&self) -> Result<Vec<String>, CommandError> {
        let path = rule_path(self.rule_number);
        let mut commands = vec![
            format!("set {} description {}", path, quote("description", &self.description)?),
            format!(
                "set {} inbound-interface name {}",
                path,
                quote("inbound_interface", ident("inbound_interface", &self.inbound_interface)?)?
            ),
            format!("set {} destination port '{}'", path, self.external_port),
            format!("set {} protocol '{}'", path, self.protocol),
        ];
        if let Some(source) = &self.source_address {
            commands.push(format!(
                "set {} source address {}",
                path,
                quote("source_address", address_or_cidr("source_address", source)?)?
            ));
        }
        commands.push(format!("set {} translation address '{}'", path, self.translation_address));
        commands.push(format!("set {} translation port '{}'", path, self.translation_port));
        if self.disabled {
            commands.push(format!("set {} disable", path));
        }
        Ok(commands)
    }

    fn delete_commands(&self) -> Result<Vec<String>, CommandError> {
        Ok(delete_rule(self.rule_number).commands)
    }

    fn disable_paths(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![rule_path(self.rule_number)])
    }
}
