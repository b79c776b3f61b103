// ── Wire bodies ──
//
// Tagged union over the typed controller models, one variant per kind.
// Payloads are decoded into the kind's model before they are sent and after
// they are received, so a value the model cannot hold fails locally instead
// of as a controller rejection.

use serde::Serialize;
use serde_json::Value;
use unifi_provider_api::models::{
    FirewallGroup, FirewallRule, NetworkConf, PortForward, UserEntry, WlanConf,
};

use crate::model::ResourceKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireBody {
    Network(NetworkConf),
    Wlan(WlanConf),
    FirewallRule(FirewallRule),
    FirewallGroup(FirewallGroup),
    PortForward(PortForward),
    User(UserEntry),
}

impl WireBody {
    /// Decode a raw JSON object as the model for `kind`.
    pub fn from_value(kind: ResourceKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ResourceKind::Network => Self::Network(serde_json::from_value(value)?),
            ResourceKind::Wlan => Self::Wlan(serde_json::from_value(value)?),
            ResourceKind::FirewallRule => Self::FirewallRule(serde_json::from_value(value)?),
            ResourceKind::FirewallGroup => Self::FirewallGroup(serde_json::from_value(value)?),
            ResourceKind::PortForward => Self::PortForward(serde_json::from_value(value)?),
            ResourceKind::User => Self::User(serde_json::from_value(value)?),
        })
    }

    /// The body as a JSON object.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Network(_) => ResourceKind::Network,
            Self::Wlan(_) => ResourceKind::Wlan,
            Self::FirewallRule(_) => ResourceKind::FirewallRule,
            Self::FirewallGroup(_) => ResourceKind::FirewallGroup,
            Self::PortForward(_) => ResourceKind::PortForward,
            Self::User(_) => ResourceKind::User,
        }
    }

    /// Controller-assigned `_id`, present on bodies the controller returned.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Network(b) => b.id.as_deref(),
            Self::Wlan(b) => b.id.as_deref(),
            Self::FirewallRule(b) => b.id.as_deref(),
            Self::FirewallGroup(b) => b.id.as_deref(),
            Self::PortForward(b) => b.id.as_deref(),
            Self::User(b) => b.id.as_deref(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_by_kind() {
        let body = WireBody::from_value(
            ResourceKind::FirewallGroup,
            json!({ "_id": "g1", "name": "cams", "group_type": "address-group" }),
        )
        .unwrap();
        assert_eq!(body.kind(), ResourceKind::FirewallGroup);
        assert_eq!(body.id(), Some("g1"));
    }

    #[test]
    fn model_rejects_ill_typed_fields() {
        let result = WireBody::from_value(ResourceKind::Network, json!({ "name": "n", "vlan": -1 }));
        assert!(result.is_err());
    }

    #[test]
    fn serializes_without_a_tag() {
        let body =
            WireBody::from_value(ResourceKind::User, json!({ "mac": "aa:bb:cc:dd:ee:ff" })).unwrap();
        assert_eq!(body.to_value().unwrap(), json!({ "mac": "aa:bb:cc:dd:ee:ff" }));
    }
}
