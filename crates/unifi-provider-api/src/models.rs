// Controller wire types
//
// The legacy `{ meta, data }` envelope plus one typed model per managed REST
// endpoint. Fields are `Option` with `skip_serializing_if` so a model
// round-trips exactly what was set, and every model keeps undocumented
// fields in `extra` so nothing the controller sends is silently dropped.

use serde::{Deserialize, Serialize};

// ── Response Envelope ────────────────────────────────────────────────

/// Standard UniFi legacy API response envelope.
///
/// ```json
/// { "meta": { "rc": "ok", "msg": "optional" }, "data": [...] }
/// ```
#[derive(Debug, Deserialize)]
pub struct LegacyResponse<T> {
    pub meta: Meta,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Metadata from the legacy envelope. `rc` == `"ok"` means success.
#[derive(Debug, Deserialize)]
pub struct Meta {
    pub rc: String,
    #[serde(default)]
    pub msg: Option<String>,
    /// Present on validation failures: names the rejected field.
    #[serde(default, rename = "validationError")]
    pub validation_error: Option<ValidationError>,
}

#[derive(Debug, Deserialize)]
pub struct ValidationError {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

type Extra = serde_json::Map<String, serde_json::Value>;

// ── rest/networkconf ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConf {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `corporate`, `guest`, `wan`, `vlan-only`, `remote-user-vpn`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networkgroup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcpd_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcpd_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcpd_stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcpd_leasetime: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub igmp_snooping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── rest/wlanconf ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WlanConf {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_passphrase: Option<String>,
    /// `open`, `wpapsk`, `wpaeap`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wpa_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networkconf_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usergroup_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_ssid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_guest: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_filter_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_filter_list: Option<Vec<String>>,
    /// `allow` or `deny`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_filter_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wlan_band: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── rest/firewallgroup ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewallGroup {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `address-group`, `port-group`, `ipv6-address-group`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_members: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── rest/firewallrule ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `WAN_IN`, `WAN_OUT`, `WAN_LOCAL`, `LAN_IN`, `LAN_OUT`, `LAN_LOCAL`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<u32>,
    /// `accept`, `drop`, `reject`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_network_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_firewallgroup_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_firewallgroup_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_established: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_related: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── rest/portforward ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortForward {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Port (or range) on the WAN side, as a string: `"443"`, `"8000-8010"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<String>,
    /// LAN address traffic is forwarded to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fwd_port: Option<String>,
    /// `tcp`, `udp`, `tcp_udp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pfwd_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── rest/user ────────────────────────────────────────────────────────

/// A known client ("user" in controller terms), keyed by MAC address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usergroup_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_fixedip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oui: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn network_keeps_unknown_fields() {
        let raw = json!({
            "_id": "5f1",
            "name": "guest",
            "vlan": 10,
            "dhcp_relay_enabled": false,
            "setting_preference": "manual"
        });
        let net: NetworkConf = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(net.vlan, Some(10));
        assert_eq!(net.extra.len(), 2);
        assert_eq!(serde_json::to_value(&net).unwrap(), raw);
    }

    #[test]
    fn envelope_parses_validation_error() {
        let raw = json!({
            "meta": {
                "rc": "error",
                "msg": "api.err.InvalidPayload",
                "validationError": { "field": "vlan", "pattern": "^[0-9]+$" }
            },
            "data": []
        });
        let env: LegacyResponse<serde_json::Value> = serde_json::from_value(raw).unwrap();
        assert_eq!(env.meta.rc, "error");
        assert_eq!(
            env.meta.validation_error.and_then(|v| v.field).as_deref(),
            Some("vlan")
        );
    }

    #[test]
    fn out_of_range_vlan_is_rejected() {
        let raw = json!({ "name": "bad", "vlan": 70000 });
        assert!(serde_json::from_value::<NetworkConf>(raw).is_err());
    }
}
