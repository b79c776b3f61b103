//! Resource file decoding.
//!
//! A resource file is a YAML map from instance address to attributes:
//!
//! ```yaml
//! network.iot:
//!   name: IoT
//!   vlan: 20
//! wlan.iot:
//!   name: iot-devices
//!   x_passphrase: correct-horse
//!   networkconf_id: ${network.iot}
//! firewall_group.cams:
//!   name: cameras
//!   group_type: address-group
//!   group_members: [10.0.20.0/24]
//! firewall_rule.block_iot:
//!   name: block iot to lan
//!   ruleset: LAN_IN
//!   rule_index: 2000
//!   action: drop
//!   src_firewallgroup_ids: ["${firewall_group.cams}"]
//!   depends_on: [wlan.iot]
//! ```
//!
//! A string value of the form `${kind.name}` is a reference: it becomes the
//! controller id of that instance once applied. Inside a list, each such
//! element becomes one id, after the literal elements. `depends_on` adds
//! ordering without a reference.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use unifi_provider_core::{InstanceAddress, Reference, ResourceSpec};

use crate::error::CliError;

const DEPENDS_ON: &str = "depends_on";

type Document = BTreeMap<String, BTreeMap<String, Value>>;

pub fn load(path: &Path) -> Result<Vec<ResourceSpec>, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::ResourceFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse(&text).map_err(|reason| CliError::ResourceFile {
        path: path.display().to_string(),
        reason,
    })
}

pub fn parse(text: &str) -> Result<Vec<ResourceSpec>, String> {
    let document: Option<Document> = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    document
        .unwrap_or_default()
        .into_iter()
        .map(|(address, body)| decode(&address, body))
        .collect()
}

fn decode(address: &str, body: BTreeMap<String, Value>) -> Result<ResourceSpec, String> {
    let address: InstanceAddress = address.parse().map_err(|e| format!("{e}"))?;
    let mut spec = ResourceSpec::new(address);

    for (name, value) in body {
        if name == DEPENDS_ON {
            spec.depends_on = depends_on(&spec.address, value)?;
            continue;
        }
        match value {
            Value::Array(items) if items.iter().any(|item| reference(item).is_some()) => {
                let mut literals = Vec::new();
                let mut targets = Vec::new();
                for item in items {
                    match reference(&item).map(|t| target(&spec.address, &name, t)) {
                        Some(address) => targets.push(address?),
                        None => literals.push(item),
                    }
                }
                if !literals.is_empty() {
                    spec.attributes.insert(name.clone(), Value::Array(literals));
                }
                spec.references.insert(name, Reference::Each(targets));
            }
            value => match reference(&value).map(|t| target(&spec.address, &name, t)) {
                Some(address) => {
                    spec.references.insert(name, Reference::One(address?));
                }
                None => {
                    spec.attributes.insert(name, value);
                }
            },
        }
    }
    Ok(spec)
}

fn target(address: &InstanceAddress, name: &str, target: &str) -> Result<InstanceAddress, String> {
    target.parse().map_err(|e| format!("{address}.{name}: {e}"))
}

/// `${kind.name}` -> `kind.name`.
fn reference(value: &Value) -> Option<&str> {
    value
        .as_str()?
        .strip_prefix("${")?
        .strip_suffix('}')
        .map(str::trim)
}

fn depends_on(address: &InstanceAddress, value: Value) -> Result<Vec<InstanceAddress>, String> {
    let Value::Array(items) = value else {
        return Err(format!("{address}.{DEPENDS_ON}: expected a list of addresses"));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => s
                .parse()
                .map_err(|e| format!("{address}.{DEPENDS_ON}: {e}")),
            other => Err(format!("{address}.{DEPENDS_ON}: expected an address, got {other}")),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use unifi_provider_core::ResourceKind;

    use super::*;

    #[test]
    fn decodes_attributes_references_and_ordering() {
        let specs = parse(
            r"
network.iot:
  name: IoT
  vlan: 20
wlan.iot:
  name: iot-devices
  networkconf_id: ${network.iot}
  depends_on: [network.iot]
",
        )
        .unwrap();

        assert_eq!(specs.len(), 2);
        let network = &specs[0];
        assert_eq!(network.address, InstanceAddress::new(ResourceKind::Network, "iot"));
        assert_eq!(network.attributes["vlan"], json!(20));

        let wlan = &specs[1];
        assert_eq!(wlan.address.kind, ResourceKind::Wlan);
        assert_eq!(
            wlan.references["networkconf_id"],
            Reference::One(network.address.clone())
        );
        assert!(!wlan.attributes.contains_key("networkconf_id"));
        assert_eq!(wlan.depends_on, vec![network.address.clone()]);
    }

    #[test]
    fn list_elements_can_reference_instances() {
        let specs = parse(
            r#"
firewall_rule.block_cams:
  name: block cams
  src_firewallgroup_ids: ["${firewall_group.cams}"]
  dst_firewallgroup_ids:
    - g0
    - ${firewall_group.lan}
"#,
        )
        .unwrap();
        let rule = &specs[0];
        let group = |name| InstanceAddress::new(ResourceKind::FirewallGroup, name);

        assert_eq!(
            rule.references["src_firewallgroup_ids"],
            Reference::Each(vec![group("cams")])
        );
        assert!(!rule.attributes.contains_key("src_firewallgroup_ids"));
        assert_eq!(
            rule.references["dst_firewallgroup_ids"],
            Reference::Each(vec![group("lan")])
        );
        assert_eq!(rule.attributes["dst_firewallgroup_ids"], json!(["g0"]));
        assert_eq!(rule.dependencies(), vec![group("cams"), group("lan")]);
    }

    #[test]
    fn empty_file_declares_nothing() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn bad_addresses_are_reported() {
        let err = parse("vpn.office:\n  name: x\n").unwrap_err();
        assert!(err.contains("vpn"), "{err}");

        let err = parse("network.iot:\n  depends_on: network.lan\n").unwrap_err();
        assert!(err.contains("depends_on"), "{err}");
    }
}
