use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::ReconcileError;

/// The closed set of resource kinds the provider manages.
///
/// Each kind names one schema and one REST collection on the controller.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Wlan,
    FirewallRule,
    FirewallGroup,
    PortForward,
    User,
}

impl ResourceKind {
    /// REST collection under `/api/s/{site}/rest/`.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Network => "networkconf",
            Self::Wlan => "wlanconf",
            Self::FirewallRule => "firewallrule",
            Self::FirewallGroup => "firewallgroup",
            Self::PortForward => "portforward",
            Self::User => "user",
        }
    }

    /// Parse a kind name, failing with [`ReconcileError::UnknownKind`].
    pub fn parse(name: &str) -> Result<Self, ReconcileError> {
        name.parse().map_err(|_| ReconcileError::UnknownKind {
            name: name.to_owned(),
        })
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in ResourceKind::iter() {
            assert_eq!(ResourceKind::parse(kind.as_str()).ok(), Some(kind));
        }
        assert_eq!(ResourceKind::FirewallRule.to_string(), "firewall_rule");
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            ResourceKind::parse("vpn_tunnel"),
            Err(ReconcileError::UnknownKind { name }) if name == "vpn_tunnel"
        ));
    }
}
