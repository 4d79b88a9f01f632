//! VyOS command generation
//!
//! Pure mapping from a device entity plus an [`Action`] to an ordered
//! [`CommandBatch`] in the router's CLI grammar. Nothing here talks to the
//! device or checks that referenced entities exist.
//!
//! Commands inside a batch are applied by the device in submission order, so
//! every generator emits dependent attributes in a fixed order. `enable` and
//! `disable` never remove an entity; they toggle its `disable` node so that
//! numbered resources (NAT rules, firewall rules) keep their reservation.
//!
//! # Example
//!
//! ```
//! use vyos_commands::{generate, Action, DeviceEntity, PortForward, PortKind, Protocol};
//! use std::net::Ipv4Addr;
//!
//! let rule = PortForward {
//!     rule_number: 10001,
//!     description: "vm1 SSH".to_string(),
//!     inbound_interface: "eth0".to_string(),
//!     external_port: 2201,
//!     protocol: Protocol::Tcp,
//!     source_address: None,
//!     translation_address: Ipv4Addr::new(192, 168, 1, 10),
//!     translation_port: PortKind::Ssh.translation_port(),
//!     disabled: false,
//! };
//! let batch = generate(&DeviceEntity::PortForward(rule), Action::Set).unwrap();
//! assert_eq!(batch.commands[2], "set nat destination rule 10001 destination port '2201'");
//! ```

pub mod action;
pub mod description;
pub mod dhcp;
pub mod entity;
pub mod error;
pub mod firewall;
pub mod port_forward;
pub mod route;
pub mod syntax;
pub mod vpn;

pub use action::{Action, CommandBatch, Op};
pub use description::{canonical_description, parse_description, DescriptionError, RuleKey};
pub use dhcp::{DhcpPool, StaticMapping};
pub use entity::{generate, DeviceConfig, DeviceEntity, EntityKind};
pub use error::CommandError;
pub use firewall::{FirewallAction, FirewallPolicy, FirewallRule, SubnetConnection, SubnetIsolation};
pub use port_forward::{PortForward, PortKind, Protocol};
pub use route::StaticRoute;
pub use vpn::{VpnTunnel, WireguardPeer};
