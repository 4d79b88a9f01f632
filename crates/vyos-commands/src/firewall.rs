//! Firewall policies, rules and subnet isolation

use crate::entity::DeviceConfig;
use crate::error::CommandError;
use crate::port_forward::Protocol;
use crate::syntax::{address_or_cidr, cidr, ident, quote};
use serde::{Deserialize, Serialize};

/// Verdict of a firewall rule or policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallAction {
    /// Let the packet through
    #[default]
    Accept,
    /// Silently discard
    Drop,
    /// Discard and answer with an ICMP error
    Reject,
}

impl FirewallAction {
    /// CLI keyword
    pub fn as_str(self) -> &'static str {
        match self {
            FirewallAction::Accept => "accept",
            FirewallAction::Drop => "drop",
            FirewallAction::Reject => "reject",
        }
    }
}

/// Named IPv4 rule set with a default action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallPolicy {
    /// Policy name
    pub name: String,
    /// Action for packets no rule matches
    pub default_action: FirewallAction,
    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rules set together with the policy
    #[serde(default)]
    pub rules: Vec<FirewallRule>,
}

/// One numbered rule inside a named policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    /// Name of the owning policy
    pub policy: String,
    /// Rule number within the policy
    pub number: u32,
    /// Verdict on match
    pub action: FirewallAction,
    /// Match this protocol only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    /// Match this source address or CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    /// Match this destination address or CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_address: Option<String>,
    /// Match this destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,
    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn policy_path(name: &str) -> Result<String, CommandError> {
    Ok(format!("firewall ipv4 name {}", ident("policy", name)?))
}

fn forward_rule_path(number: u32) -> String {
    format!("firewall ipv4 forward filter rule {}", number)
}

/// Shared match attributes of a filter rule
struct Match<'a> {
    action: FirewallAction,
    protocol: Option<Protocol>,
    source: Option<&'a str>,
    source_group: Option<&'a str>,
    destination: Option<&'a str>,
    destination_group: Option<&'a str>,
    destination_port: Option<u16>,
    description: Option<&'a str>,
}

impl Match<'_> {
    fn commands(&self, path: &str) -> Result<Vec<String>, CommandError> {
        let mut commands = Vec::new();
        if let Some(description) = self.description {
            commands.push(format!("set {} description {}", path, quote("description", description)?));
        }
        commands.push(format!("set {} action '{}'", path, self.action.as_str()));
        if let Some(protocol) = self.protocol {
            commands.push(format!("set {} protocol '{}'", path, protocol.as_str()));
        }
        if let Some(source) = self.source {
            commands.push(format!(
                "set {} source address '{}'",
                path,
                address_or_cidr("source_address", source)?
            ));
        }
        if let Some(group) = self.source_group {
            commands.push(format!("set {} source group network-group '{}'", path, ident("group", group)?));
        }
        if let Some(destination) = self.destination {
            commands.push(format!(
                "set {} destination address '{}'",
                path,
                address_or_cidr("destination_address", destination)?
            ));
        }
        if let Some(group) = self.destination_group {
            commands.push(format!(
                "set {} destination group network-group '{}'",
                path,
                ident("group", group)?
            ));
        }
        if let Some(port) = self.destination_port {
            if self.protocol.is_none() {
                return Err(CommandError::Empty { field: "protocol" });
            }
            commands.push(format!("set {} destination port '{}'", path, port));
        }
        Ok(commands)
    }
}

impl FirewallRule {
    fn path(&self) -> Result<String, CommandError> {
        Ok(format!("{} rule {}", policy_path(&self.policy)?, self.number))
    }

    fn matcher(&self) -> Match<'_> {
        Match {
            action: self.action,
            protocol: self.protocol,
            source: self.source_address.as_deref(),
            source_group: None,
            destination: self.destination_address.as_deref(),
            destination_group: None,
            destination_port: self.destination_port,
            description: self.description.as_deref(),
        }
    }
}

impl DeviceConfig for FirewallRule {
    fn set_commands(&self) -> Result<Vec<String>, CommandError> {
        self.matcher().commands(&self.path()?)
    }

    fn delete_commands(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![format!("delete {}", self.path()?)])
    }

    fn disable_paths(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![self.path()?])
    }
}

impl DeviceConfig for FirewallPolicy {
    fn set_commands(&self) -> Result<Vec<String>, CommandError> {
        let path = policy_path(&self.name)?;
        let mut commands = vec![format!(
            "set {} default-action '{}'",
            path,
            self.default_action.as_str()
        )];
        if let Some(description) = &self.description {
            commands.push(format!("set {} description {}", path, quote("description", description)?));
        }
        for rule in &self.rules {
            if rule.policy != self.name {
                return Err(CommandError::InvalidValue {
                    field: "policy",
                    value: rule.policy.clone(),
                });
            }
            commands.extend(rule.set_commands()?);
        }
        Ok(commands)
    }

    fn delete_commands(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![format!("delete {}", policy_path(&self.name)?)])
    }

    /// Policies have no `disable` node of their own; each rule is toggled
    fn disable_paths(&self) -> Result<Vec<String>, CommandError> {
        if self.rules.is_empty() {
            return Err(CommandError::Empty { field: "rules" });
        }
        self.rules.iter().map(|rule| rule.path()).collect()
    }
}

/// Block forwarding from a subnet to a set of other subnets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetIsolation {
    /// Network group holding the isolated destinations
    pub name: String,
    /// Rule number in the forward filter
    pub rule_number: u32,
    /// Isolated source subnet, CIDR
    pub subnet: String,
    /// Destination subnets, CIDR
    pub isolated_from: Vec<String>,
    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SubnetIsolation {
    fn group_path(&self) -> Result<String, CommandError> {
        Ok(format!("firewall group network-group {}", ident("name", &self.name)?))
    }
}

impl DeviceConfig for SubnetIsolation {
    fn set_commands(&self) -> Result<Vec<String>, CommandError> {
        if self.isolated_from.is_empty() {
            return Err(CommandError::Empty { field: "isolated_from" });
        }
        let group = self.group_path()?;
        let mut commands = Vec::new();
        for network in &self.isolated_from {
            commands.push(format!("set {} network '{}'", group, cidr("isolated_from", network)?));
        }
        let matcher = Match {
            action: FirewallAction::Drop,
            protocol: None,
            source: Some(&self.subnet),
            source_group: None,
            destination: None,
            destination_group: Some(&self.name),
            destination_port: None,
            description: self.description.as_deref(),
        };
        cidr("subnet", &self.subnet)?;
        commands.extend(matcher.commands(&forward_rule_path(self.rule_number))?);
        Ok(commands)
    }

    fn delete_commands(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![
            format!("delete {}", forward_rule_path(self.rule_number)),
            format!("delete {}", self.group_path()?),
        ])
    }

    fn disable_paths(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![forward_rule_path(self.rule_number)])
    }
}

/// Explicitly allow forwarding between two subnets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetConnection {
    /// Rule number in the forward filter
    pub rule_number: u32,
    /// Source subnet, CIDR
    pub source: String,
    /// Destination subnet, CIDR
    pub destination: String,
    /// Match this protocol only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    /// Match this destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,
    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DeviceConfig for SubnetConnection {
    fn set_commands(&self) -> Result<Vec<String>, CommandError> {
        let matcher = Match {
            action: FirewallAction::Accept,
            protocol: self.protocol,
            source: Some(&self.source),
            source_group: None,
            destination: Some(&self.destination),
            destination_group: None,
            destination_port: self.destination_port,
            description: self.description.as_deref(),
        };
        matcher.commands(&forward_rule_path(self.rule_number))
    }

    fn delete_commands(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![format!("delete {}", forward_rule_path(self.rule_number))])
    }

    fn disable_paths(&self) -> Result<Vec<String>, CommandError> {
        Ok(vec![forward_rule_path(self.rule_number)])
    }
}
