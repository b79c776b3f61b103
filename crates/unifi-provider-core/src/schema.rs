// ── Resource schema registry ──
//
// Per-kind attribute tables: type, presence, force-new marker, default.
// The builtin registry is built once from a fixed table and never mutated;
// tests may build their own from explicit schemas.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ReconcileError;
use crate::model::{Attributes, Reference, ResourceKind, ResourceSpec};

// ── Attribute types ──────────────────────────────────────────────────

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    String,
    Int,
    Float,
    Bool,
    /// Ordered; compared element by element.
    List(Box<AttrType>),
    /// Unordered; compared as a multiset.
    Set(Box<AttrType>),
}

impl AttrType {
    pub fn list_of(inner: AttrType) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn set_of(inner: AttrType) -> Self {
        Self::Set(Box::new(inner))
    }

    /// Whether `value` is a well-typed (non-null) value of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_)) | (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(is_integral)
            }
            (Self::Float, Value::Number(_)) => true,
            (Self::List(inner) | Self::Set(inner), Value::Array(items)) => {
                items.iter().all(|item| inner.accepts(item))
            }
            _ => false,
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("bool"),
            Self::List(inner) => write!(f, "list({inner})"),
            Self::Set(inner) => write!(f, "set({inner})"),
        }
    }
}

/// Who supplies an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Presence {
    Required,
    Optional,
    /// Only ever populated from controller responses.
    Computed,
}

// ── Attributes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: AttrType,
    pub presence: Presence,
    /// Changing this attribute requires destroy-and-recreate.
    pub force_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Attribute {
    fn with_presence(name: &str, ty: AttrType, presence: Presence) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            presence,
            force_new: false,
            default: None,
        }
    }

    pub fn required(name: &str, ty: AttrType) -> Self {
        Self::with_presence(name, ty, Presence::Required)
    }

    pub fn optional(name: &str, ty: AttrType) -> Self {
        Self::with_presence(name, ty, Presence::Optional)
    }

    pub fn computed(name: &str, ty: AttrType) -> Self {
        Self::with_presence(name, ty, Presence::Computed)
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_computed(&self) -> bool {
        self.presence == Presence::Computed
    }
}

// ── Schema ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub kind: ResourceKind,
    /// Attribute used to find an instance again when its id was lost
    /// (e.g. a create whose response never arrived).
    pub identity: String,
    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(kind: ResourceKind, identity: &str, attributes: Vec<Attribute>) -> Self {
        Self {
            kind,
            identity: identity.to_owned(),
            attributes,
        }
    }

    pub fn endpoint(&self) -> &'static str {
        self.kind.endpoint()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes a user may declare.
    pub fn configurable(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| !a.is_computed())
    }

    /// Check a declared spec against this schema.
    ///
    /// Rejects missing required attributes, supplied computed attributes,
    /// unknown attribute names, and ill-typed values. An attribute filled by
    /// a reference counts as supplied.
    pub fn validate(&self, spec: &ResourceSpec) -> Result<(), ReconcileError> {
        let mut problems = Vec::new();

        if spec.kind() != self.kind {
            problems.push(format!("schema is for {}, not {}", self.kind, spec.kind()));
        }

        for (name, value) in &spec.attributes {
            match self.attribute(name) {
                None => problems.push(format!("unknown attribute '{name}'")),
                Some(attr) if attr.is_computed() => {
                    problems.push(format!("'{name}' is computed and cannot be set"));
                }
                Some(_) if value.is_null() => {}
                Some(attr) if !attr.ty.accepts(value) => {
                    problems.push(format!("'{name}' must be {}, got {value}", attr.ty));
                }
                Some(_) => {}
            }
        }

        for (name, value) in &spec.attributes {
            if let Some(placeholder) = placeholder(value) {
                problems.push(format!("'{name}' holds unresolved reference {placeholder}"));
            }
        }

        for (name, reference) in &spec.references {
            let Some(attr) = self.attribute(name) else {
                problems.push(format!("unknown reference attribute '{name}'"));
                continue;
            };
            if attr.is_computed() {
                problems.push(format!("'{name}' is computed and cannot be referenced"));
                continue;
            }
            match reference {
                Reference::One(_) if attr.ty != AttrType::String => {
                    problems.push(format!("reference attribute '{name}' must be a string"));
                }
                Reference::One(_) if spec.attributes.contains_key(name) => {
                    problems.push(format!("'{name}' is both set and referenced"));
                }
                Reference::Each(_) if !holds_ids(&attr.ty) => {
                    problems.push(format!(
                        "'{name}' is {}, element references need a list or set of strings",
                        attr.ty
                    ));
                }
                Reference::One(_) | Reference::Each(_) => {}
            }
        }

        for attr in &self.attributes {
            let supplied = spec.attributes.get(&attr.name).is_some_and(|v| !v.is_null())
                || spec.references.contains_key(&attr.name);
            if attr.presence == Presence::Required && !supplied {
                problems.push(format!("missing required attribute '{}'", attr.name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::Validation {
                address: spec.address.clone(),
                message: problems.join("; "),
            })
        }
    }

    /// Declared attributes plus defaults for absent optional ones.
    /// Nulls are dropped.
    pub fn with_defaults(&self, declared: &Attributes) -> Attributes {
        let mut out = Attributes::new();
        for attr in self.configurable() {
            let value = declared
                .get(&attr.name)
                .filter(|v| !v.is_null())
                .or(attr.default.as_ref());
            if let Some(value) = value {
                out.insert(attr.name.clone(), normalize(value));
            }
        }
        out
    }

    /// Compare two values of attribute `name` using its declared type.
    /// Unknown attributes compare structurally.
    pub fn values_equal(&self, name: &str, a: &Value, b: &Value) -> bool {
        match self.attribute(name) {
            Some(attr) => typed_equal(&attr.ty, a, b),
            None => normalize(a) == normalize(b),
        }
    }
}

fn holds_ids(ty: &AttrType) -> bool {
    matches!(ty, AttrType::List(inner) | AttrType::Set(inner) if **inner == AttrType::String)
}

/// A `${...}` reference the host left in place of a value.
fn placeholder(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if s.starts_with("${") && s.ends_with('}') => Some(s),
        Value::Array(items) => items.iter().find_map(placeholder),
        _ => None,
    }
}

// ── Normalization & comparison ───────────────────────────────────────

fn is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15
}

/// Canonical form for comparison and storage: integer-valued floats become
/// integers, recursively.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => match n.as_f64() {
            // Bounded by `is_integral`, so the cast is exact.
            Some(f) if is_integral(f) => Value::from(f as i64),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn typed_equal(ty: &AttrType, a: &Value, b: &Value) -> bool {
    match (ty, a, b) {
        (AttrType::List(inner), Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| typed_equal(inner, x, y))
        }
        (AttrType::Set(inner), Value::Array(xs), Value::Array(ys)) => {
            if xs.len() != ys.len() {
                return false;
            }
            let mut used = vec![false; ys.len()];
            xs.iter().all(|x| {
                let hit = ys
                    .iter()
                    .enumerate()
                    .find(|(i, y)| !used[*i] && typed_equal(inner, x, y))
                    .map(|(i, _)| i);
                hit.is_some_and(|i| {
                    used[i] = true;
                    true
                })
            })
        }
        (AttrType::Int | AttrType::Float, Value::Number(_), Value::Number(_)) => {
            normalize(a) == normalize(b)
        }
        _ => a == b,
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Read-only map from kind to schema. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Arc<BTreeMap<ResourceKind, Schema>>,
}

static BUILTIN: LazyLock<SchemaRegistry> =
    LazyLock::new(|| SchemaRegistry::from_schemas(builtin_schemas()));

impl SchemaRegistry {
    /// The provider's fixed schema table.
    pub fn builtin() -> SchemaRegistry {
        BUILTIN.clone()
    }

    pub fn from_schemas(schemas: impl IntoIterator<Item = Schema>) -> Self {
        Self {
            schemas: Arc::new(schemas.into_iter().map(|s| (s.kind, s)).collect()),
        }
    }

    pub fn describe(&self, kind: ResourceKind) -> Result<&Schema, ReconcileError> {
        self.schemas
            .get(&kind)
            .ok_or_else(|| ReconcileError::UnknownKind {
                name: kind.to_string(),
            })
    }

    pub fn describe_name(&self, name: &str) -> Result<&Schema, ReconcileError> {
        self.describe(ResourceKind::parse(name)?)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }
}

/// Look up a kind in the builtin registry.
pub fn describe(kind: ResourceKind) -> Result<Schema, ReconcileError> {
    BUILTIN.describe(kind).cloned()
}

// ── Builtin table ────────────────────────────────────────────────────

fn site_id() -> Attribute {
    Attribute::computed("site_id", AttrType::String)
}

fn builtin_schemas() -> Vec<Schema> {
    use AttrType::{Bool, Int, String as Str};

    vec![
        Schema::new(
            ResourceKind::Network,
            "name",
            vec![
                Attribute::required("name", Str),
                Attribute::optional("purpose", Str)
                    .force_new()
                    .default_value("corporate"),
                Attribute::optional("vlan", Int).force_new(),
                Attribute::optional("vlan_enabled", Bool),
                Attribute::optional("ip_subnet", Str),
                Attribute::optional("networkgroup", Str)
                    .force_new()
                    .default_value("LAN"),
                Attribute::optional("dhcpd_enabled", Bool),
                Attribute::optional("dhcpd_start", Str),
                Attribute::optional("dhcpd_stop", Str),
                Attribute::optional("dhcpd_leasetime", Int),
                Attribute::optional("domain_name", Str),
                Attribute::optional("igmp_snooping", Bool),
                Attribute::optional("enabled", Bool).default_value(true),
                site_id(),
            ],
        ),
        Schema::new(
            ResourceKind::Wlan,
            "name",
            vec![
                Attribute::required("name", Str),
                Attribute::optional("x_passphrase", Str),
                Attribute::optional("security", Str).default_value("wpapsk"),
                Attribute::optional("wpa_mode", Str).default_value("wpa2"),
                Attribute::optional("networkconf_id", Str),
                Attribute::optional("usergroup_id", Str),
                Attribute::optional("hide_ssid", Bool).default_value(false),
                Attribute::optional("is_guest", Bool).default_value(false),
                Attribute::optional("enabled", Bool).default_value(true),
                Attribute::optional("mac_filter_enabled", Bool),
                Attribute::optional("mac_filter_list", AttrType::set_of(Str)),
                Attribute::optional("mac_filter_policy", Str),
                Attribute::optional("wlan_band", Str),
                site_id(),
            ],
        ),
        Schema::new(
            ResourceKind::FirewallGroup,
            "name",
            vec![
                Attribute::required("name", Str),
                Attribute::required("group_type", Str).force_new(),
                Attribute::optional("group_members", AttrType::set_of(Str))
                    .default_value(json!([])),
                site_id(),
            ],
        ),
        Schema::new(
            ResourceKind::FirewallRule,
            "name",
            vec![
                Attribute::required("name", Str),
                Attribute::required("ruleset", Str).force_new(),
                Attribute::required("rule_index", Int),
                Attribute::required("action", Str),
                Attribute::optional("enabled", Bool).default_value(true),
                Attribute::optional("protocol", Str).default_value("all"),
                Attribute::optional("logging", Bool).default_value(false),
                Attribute::optional("src_network_id", Str),
                Attribute::optional("src_network_type", Str).default_value("NETv4"),
                Attribute::optional("src_address", Str),
                Attribute::optional("src_firewallgroup_ids", AttrType::set_of(Str))
                    .default_value(json!([])),
                Attribute::optional("dst_network_id", Str),
                Attribute::optional("dst_address", Str),
                Attribute::optional("dst_port", Str),
                Attribute::optional("dst_firewallgroup_ids", AttrType::set_of(Str))
                    .default_value(json!([])),
                Attribute::optional("state_established", Bool),
                Attribute::optional("state_related", Bool),
                site_id(),
            ],
        ),
        Schema::new(
            ResourceKind::PortForward,
            "name",
            vec![
                Attribute::required("name", Str),
                Attribute::required("dst_port", Str),
                Attribute::required("fwd", Str),
                Attribute::required("fwd_port", Str),
                Attribute::optional("proto", Str).default_value("tcp_udp"),
                Attribute::optional("src", Str).default_value("any"),
                Attribute::optional("pfwd_interface", Str)
                    .force_new()
                    .default_value("wan"),
                Attribute::optional("enabled", Bool).default_value(true),
                Attribute::optional("log", Bool).default_value(false),
                site_id(),
            ],
        ),
        Schema::new(
            ResourceKind::User,
            "mac",
            vec![
                Attribute::required("mac", Str).force_new(),
                Attribute::optional("name", Str),
                Attribute::optional("note", Str),
                Attribute::optional("usergroup_id", Str),
                Attribute::optional("use_fixedip", Bool).default_value(false),
                Attribute::optional("fixed_ip", Str),
                Attribute::optional("network_id", Str),
                Attribute::computed("hostname", Str),
                Attribute::computed("oui", Str),
                Attribute::computed("first_seen", Int),
                Attribute::computed("last_seen", Int),
                site_id(),
            ],
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::model::InstanceAddress;

    fn network(name: &str) -> ResourceSpec {
        ResourceSpec::new(InstanceAddress::new(ResourceKind::Network, name))
    }

    #[test]
    fn builtin_registry_covers_every_kind() {
        let registry = SchemaRegistry::builtin();
        for kind in ResourceKind::iter() {
            let schema = registry.describe(kind).unwrap();
            assert!(schema.attribute(&schema.identity).is_some(), "{kind}");
        }
        assert!(registry.describe_name("network").unwrap().attribute("vlan").unwrap().force_new);
    }

    #[test]
    fn unknown_kind_name_fails() {
        let registry = SchemaRegistry::builtin();
        assert!(matches!(
            registry.describe_name("vpn"),
            Err(ReconcileError::UnknownKind { .. })
        ));
    }

    #[test]
    fn explicit_registry_only_knows_its_schemas() {
        let registry = SchemaRegistry::from_schemas([Schema::new(
            ResourceKind::Network,
            "name",
            vec![Attribute::required("name", AttrType::String)],
        )]);
        assert!(registry.describe(ResourceKind::Network).is_ok());
        assert!(matches!(
            registry.describe(ResourceKind::Wlan),
            Err(ReconcileError::UnknownKind { .. })
        ));
    }

    #[test]
    fn validate_accepts_minimal_network() {
        let schema = describe(ResourceKind::Network).unwrap();
        schema.validate(&network("guest").with("name", "guest").with("vlan", 10)).unwrap();
    }

    #[test]
    fn validate_rejects_computed_unknown_and_missing() {
        let schema = describe(ResourceKind::Network).unwrap();
        let spec = network("bad").with("site_id", "abc").with("colour", "red");

        let err = schema.validate(&spec).unwrap_err();
        let ReconcileError::Validation { message, .. } = err else {
            panic!("expected Validation");
        };
        assert!(message.contains("'site_id' is computed"));
        assert!(message.contains("unknown attribute 'colour'"));
        assert!(message.contains("missing required attribute 'name'"));
    }

    #[test]
    fn validate_type_checks_values() {
        let schema = describe(ResourceKind::Network).unwrap();
        let spec = network("n").with("name", "n").with("vlan", "ten");
        assert!(schema.validate(&spec).is_err());

        let spec = network("n").with("name", "n").with("vlan", 10.0);
        schema.validate(&spec).unwrap();
    }

    #[test]
    fn reference_satisfies_required_attribute() {
        let schema = Schema::new(
            ResourceKind::Wlan,
            "name",
            vec![
                Attribute::required("name", AttrType::String),
                Attribute::required("networkconf_id", AttrType::String),
            ],
        );
        let spec = ResourceSpec::new(InstanceAddress::new(ResourceKind::Wlan, "w"))
            .with("name", "w")
            .reference("networkconf_id", InstanceAddress::new(ResourceKind::Network, "n"));
        schema.validate(&spec).unwrap();
    }

    #[test]
    fn element_references_need_a_collection_of_ids() {
        let schema = describe(ResourceKind::FirewallRule).unwrap();
        let rule = || {
            ResourceSpec::new(InstanceAddress::new(ResourceKind::FirewallRule, "r"))
                .with("name", "r")
                .with("ruleset", "LAN_IN")
                .with("rule_index", 2000)
                .with("action", "drop")
        };
        let cams = InstanceAddress::new(ResourceKind::FirewallGroup, "cams");

        schema
            .validate(&rule().reference_each("src_firewallgroup_ids", [cams.clone()]))
            .unwrap();

        let err = schema
            .validate(&rule().reference_each("src_network_id", [cams.clone()]))
            .unwrap_err();
        assert!(err.to_string().contains("list or set of strings"), "{err}");

        let err = schema
            .validate(&rule().reference("src_firewallgroup_ids", cams))
            .unwrap_err();
        assert!(err.to_string().contains("must be a string"), "{err}");
    }

    #[test]
    fn leftover_placeholders_are_rejected() {
        let schema = describe(ResourceKind::FirewallRule).unwrap();
        let spec = ResourceSpec::new(InstanceAddress::new(ResourceKind::FirewallRule, "r"))
            .with("name", "r")
            .with("ruleset", "LAN_IN")
            .with("rule_index", 2000)
            .with("action", "drop")
            .with("dst_firewallgroup_ids", json!(["${firewall_group.cams}"]));

        let err = schema.validate(&spec).unwrap_err();
        assert!(err.to_string().contains("${firewall_group.cams}"), "{err}");
    }

    #[test]
    fn defaults_fill_absent_optionals_only() {
        let schema = describe(ResourceKind::Network).unwrap();
        let spec = network("g").with("name", "g").with("purpose", "guest");
        let filled = schema.with_defaults(&spec.attributes);

        assert_eq!(filled["purpose"], "guest");
        assert_eq!(filled["networkgroup"], "LAN");
        assert_eq!(filled["enabled"], true);
        assert!(!filled.contains_key("vlan"));
        assert!(!filled.contains_key("site_id"));
    }

    #[test]
    fn integral_floats_normalize_to_integers() {
        assert_eq!(normalize(&json!(10.0)), json!(10));
        assert_eq!(normalize(&json!(10.5)), json!(10.5));
        assert_eq!(normalize(&json!([1.0, {"a": 2.0}])), json!([1, {"a": 2}]));
    }

    #[test]
    fn sets_ignore_order_lists_do_not() {
        let set = AttrType::set_of(AttrType::String);
        let list = AttrType::list_of(AttrType::String);
        let a = json!(["a", "b", "b"]);
        let b = json!(["b", "a", "b"]);
        let c = json!(["a", "a", "b"]);

        assert!(typed_equal(&set, &a, &b));
        assert!(!typed_equal(&set, &a, &c));
        assert!(!typed_equal(&list, &a, &b));
        assert!(typed_equal(&list, &a, &a));
    }

    #[test]
    fn numbers_compare_after_normalization() {
        let schema = describe(ResourceKind::Network).unwrap();
        assert!(schema.values_equal("vlan", &json!(10), &json!(10.0)));
        assert!(!schema.values_equal("vlan", &json!(10), &json!(11)));
    }
}
