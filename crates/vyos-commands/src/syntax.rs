//! CLI grammar helpers
//!
//! Values are emitted single-quoted; path identifiers (interface names,
//! network names, policy names) are emitted bare and restricted to a safe
//! character set.

use crate::error::CommandError;
use std::net::Ipv4Addr;

/// Quote a value, rejecting characters that cannot appear inside `'…'`
pub fn quote(field: &'static str, value: &str) -> Result<String, CommandError> {
    if value.chars().any(|c| c == '\'' || c.is_control()) {
        return Err(CommandError::InvalidValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(format!("'{}'", value))
}

/// Validate a bare path identifier
pub fn ident<'a>(field: &'static str, value: &'a str) -> Result<&'a str, CommandError> {
    if value.is_empty() {
        return Err(CommandError::Empty { field });
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(CommandError::InvalidValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Validate an IPv4 CIDR such as `192.168.1.0/24`
pub fn cidr<'a>(field: &'static str, value: &'a str) -> Result<&'a str, CommandError> {
    let invalid = || CommandError::InvalidValue {
        field,
        value: value.to_string(),
    };
    let (addr, prefix) = value.split_once('/').ok_or_else(invalid)?;
    addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
    match prefix.parse::<u8>() {
        Ok(len) if len <= 32 => Ok(value),
        _ => Err(invalid()),
    }
}

/// Validate an address restriction: a bare IPv4 address or a CIDR
pub fn address_or_cidr<'a>(field: &'static str, value: &'a str) -> Result<&'a str, CommandError> {
    if value.contains('/') {
        return cidr(field, value);
    }
    value
        .parse::<Ipv4Addr>()
        .map(|_| value)
        .map_err(|_| CommandError::InvalidValue {
            field,
            value: value.to_string(),
        })
}

/// Split a command line into tokens, honouring single quotes
///
/// `set nat destination rule 5 description 'vm1 SSH'` yields
/// `["set", "nat", "destination", "rule", "5", "description", "vm1 SSH"]`.
pub fn tokenize(command: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in command.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quoted {
        return Err(CommandError::Malformed(command.to_string()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
