//! Controller configuration
//!
//! Read once at startup from environment variables. Parsing goes through
//! [`Config::from_lookup`] so it can be tested without touching the process
//! environment.

use crate::error::ControllerError;
use allocator::{AddressRange, PortRange, RangeConfig};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Controller settings, read from the environment
pub struct Config {
    pub device_url: String,
    pub device_key: String,
    pub device_key_id: String,
    pub device_timeout: Duration,
    pub device_accept_invalid_certs: bool,
    pub inbound_interface: String,
    pub ranges: RangeConfig,
    /// `None` disables the periodic loop
    pub reconcile_interval: Option<Duration>,
    pub listen_addr: SocketAddr,
    pub store_path: Option<PathBuf>,
    pub task_ttl: Duration,
    pub task_capacity: usize,
    pub compensation_attempts: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("device_url", &self.device_url)
            .field("device_key", &"<redacted>")
            .field("device_key_id", &self.device_key_id)
            .field("device_timeout", &self.device_timeout)
            .field("device_accept_invalid_certs", &self.device_accept_invalid_certs)
            .field("inbound_interface", &self.inbound_interface)
            .field("ranges", &self.ranges)
            .field("reconcile_interval", &self.reconcile_interval)
            .field("listen_addr", &self.listen_addr)
            .field("store_path", &self.store_path)
            .field("task_ttl", &self.task_ttl)
            .field("task_capacity", &self.task_capacity)
            .field("compensation_attempts", &self.compensation_attempts)
            .finish()
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ControllerError>
where
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{}={:?}: {}", name, raw, e))),
        _ => Ok(default),
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, ControllerError> {
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ControllerError::InvalidConfig(format!("{} environment variable is required", name)))
}

impl Config {
    /// Read settings from process environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, applying defaults for unset variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let invalid = |e: allocator::AllocatorError| ControllerError::InvalidConfig(e.to_string());

        let addresses = AddressRange::new(
            parse(&lookup, "INTERNAL_PREFIX", Ipv4Addr::new(192, 168, 1, 0))?,
            parse(&lookup, "INTERNAL_START", 10u8)?,
            parse(&lookup, "INTERNAL_END", 250u8)?,
        )
        .map_err(invalid)?;
        let ports = PortRange::new(parse(&lookup, "PORT_START", 2200u16)?, parse(&lookup, "PORT_END", 2999u16)?)
            .map_err(invalid)?;

        let interval_secs: u64 = parse(&lookup, "RECONCILE_INTERVAL_SECS", 300)?;
        let timeout_secs: u64 = parse(&lookup, "DEVICE_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(ControllerError::InvalidConfig("DEVICE_TIMEOUT_SECS must be non-zero".to_string()));
        }
        let task_capacity: usize = parse(&lookup, "TASK_CAPACITY", 256)?;
        if task_capacity == 0 {
            return Err(ControllerError::InvalidConfig("TASK_CAPACITY must be non-zero".to_string()));
        }

        Ok(Self {
            device_url: required(&lookup, "DEVICE_URL")?,
            device_key: required(&lookup, "DEVICE_KEY")?,
            device_key_id: parse(&lookup, "DEVICE_KEY_ID", "port-forward-controller".to_string())?,
            device_timeout: Duration::from_secs(timeout_secs),
            device_accept_invalid_certs: parse(&lookup, "DEVICE_ACCEPT_INVALID_CERTS", false)?,
            inbound_interface: parse(&lookup, "INBOUND_INTERFACE", "eth0".to_string())?,
            ranges: RangeConfig { addresses, ports },
            reconcile_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            listen_addr: parse(&lookup, "LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            store_path: lookup("STORE_PATH").filter(|p| !p.trim().is_empty()).map(PathBuf::from),
            task_ttl: Duration::from_secs(parse(&lookup, "TASK_TTL_SECS", 3600)?),
            task_capacity,
            compensation_attempts: parse(&lookup, "COMPENSATION_ATTEMPTS", 3u32)?.max(1),
        })
    }
}
