//! Device RPC envelopes and the live NAT rule view

use crate::error::DeviceApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::Ipv4Addr;
use vyos_commands::{Op, Protocol};

/// Config path holding destination NAT rules
pub const NAT_RULE_PATH: [&str; 3] = ["nat", "destination", "rule"];

/// Body of `POST /configure`
#[derive(Debug, Serialize)]
pub struct ConfigureRequest<'a> {
    /// `set` or `delete`
    pub op: Op,
    /// Correlation id echoed in logs
    pub id: &'a str,
    /// API key
    pub key: &'a str,
    /// Ordered CLI commands
    pub commands: &'a [String],
}

/// Body of `POST /retrieve`
#[derive(Debug, Serialize)]
pub struct RetrieveRequest<'a> {
    /// Always `showConfig`
    pub op: &'static str,
    /// Correlation id echoed in logs
    pub id: &'a str,
    /// API key
    pub key: &'a str,
    /// Config path to read
    pub path: &'a [&'a str],
}

/// Response body shared by every device endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceResponse {
    /// Whether the device accepted the request
    pub success: bool,
    /// Payload of a successful read
    #[serde(default)]
    pub data: Value,
    /// Failure detail, a string or an object with `message`
    #[serde(default)]
    pub error: Value,
}

/// Pull a human readable message out of an `error` field
///
/// The device uses both `"error": "text"` and `"error": {"message": "text"}`.
pub fn error_message(error: &Value) -> Option<String> {
    match error {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map.get("message").and_then(error_message),
        _ => None,
    }
}

/// One destination NAT rule as the device currently holds it
///
/// Every attribute is optional because the device accepts partially
/// configured rules; a missing attribute simply compares unequal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRule {
    /// NAT rule number
    pub number: u32,
    /// Free-text description
    pub description: Option<String>,
    /// Inbound interface
    pub inbound_interface: Option<String>,
    /// External destination port
    pub destination_port: Option<u16>,
    /// Translation address
    pub translation_address: Option<Ipv4Addr>,
    /// Translation port
    pub translation_port: Option<u16>,
    /// Transport protocol
    pub protocol: Option<Protocol>,
    /// Source address restriction
    pub source_address: Option<String>,
    /// Whether the `disable` node is set
    pub disabled: bool,
}

fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn nested<'a>(node: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (last, parents) = path.split_last()?;
    let mut current = node;
    for key in parents {
        current = current.get(*key)?.as_object()?;
    }
    current.get(*last)
}

impl DeviceRule {
    fn from_node(number: u32, node: &Map<String, Value>) -> Self {
        Self {
            number,
            description: scalar(node.get("description")),
            inbound_interface: scalar(nested(node, &["inbound-interface", "name"])),
            destination_port: scalar(nested(node, &["destination", "port"])).and_then(|p| p.parse().ok()),
            translation_address: scalar(nested(node, &["translation", "address"])).and_then(|a| a.parse().ok()),
            translation_port: scalar(nested(node, &["translation", "port"])).and_then(|p| p.parse().ok()),
            protocol: scalar(node.get("protocol")).and_then(|p| p.parse().ok()),
            source_address: scalar(nested(node, &["source", "address"])),
            disabled: node.contains_key("disable"),
        }
    }

    /// Parse the `showConfig` tree under [`NAT_RULE_PATH`], sorted by rule number
    ///
    /// `null` or an empty object means the device holds no rules.
    pub fn from_tree(data: &Value) -> Result<Vec<DeviceRule>, DeviceApiError> {
        let tree = match data {
            Value::Null => return Ok(Vec::new()),
            Value::Object(map) => map,
            other => {
                return Err(DeviceApiError::MalformedResponse(format!(
                    "expected NAT rule tree, got {}",
                    other
                )))
            }
        };

        let mut rules = Vec::with_capacity(tree.len());
        for (key, node) in tree {
            let number = key.parse::<u32>().map_err(|_| {
                DeviceApiError::MalformedResponse(format!("non-numeric NAT rule key: {}", key))
            })?;
            let empty = Map::new();
            let node = node.as_object().unwrap_or(&empty);
            rules.push(DeviceRule::from_node(number, node));
        }
        rules.sort_by_key(|rule| rule.number);
        Ok(rules)
    }
}
