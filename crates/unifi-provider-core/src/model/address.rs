use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ResourceKind;
use crate::error::ReconcileError;

/// One declared instance in configuration, written `kind.name`
/// (e.g. `network.guest`). Stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceAddress {
    pub kind: ResourceKind,
    pub name: String,
}

impl InstanceAddress {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for InstanceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for InstanceAddress {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s.split_once('.').ok_or_else(|| ReconcileError::Config {
            message: format!("invalid address '{s}' (expected kind.name)"),
        })?;
        if name.is_empty() {
            return Err(ReconcileError::Config {
                message: format!("invalid address '{s}': empty name"),
            });
        }
        Ok(Self::new(ResourceKind::parse(kind)?, name))
    }
}

impl TryFrom<String> for InstanceAddress {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstanceAddress> for String {
    fn from(address: InstanceAddress) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_and_name() {
        let address: InstanceAddress = "firewall_rule.block_iot".parse().unwrap();
        assert_eq!(address.kind, ResourceKind::FirewallRule);
        assert_eq!(address.name, "block_iot");
        assert_eq!(address.to_string(), "firewall_rule.block_iot");
    }

    #[test]
    fn names_may_contain_dots() {
        let address: InstanceAddress = "user.printer.lan".parse().unwrap();
        assert_eq!(address.name, "printer.lan");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!("network".parse::<InstanceAddress>().is_err());
        assert!("network.".parse::<InstanceAddress>().is_err());
        assert!(matches!(
            "bogus.x".parse::<InstanceAddress>(),
            Err(ReconcileError::UnknownKind { .. })
        ));
    }

    #[test]
    fn serializes_as_a_string() {
        let address = InstanceAddress::new(ResourceKind::Network, "guest");
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"network.guest\"");
        let back: InstanceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
