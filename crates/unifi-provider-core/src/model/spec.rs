use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Attributes, InstanceAddress, ResourceKind};

/// Where a referencing attribute gets its controller ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    /// The attribute is the target's id.
    One(InstanceAddress),
    /// The attribute is a list or set: any literal elements declared for it,
    /// followed by each target's id.
    Each(Vec<InstanceAddress>),
}

impl Reference {
    pub fn targets(&self) -> &[InstanceAddress] {
        match self {
            Self::One(target) => std::slice::from_ref(target),
            Self::Each(targets) => targets,
        }
    }

    /// The attribute value once every target has an id, or `None` while
    /// some target has none yet.
    pub fn resolve(
        &self,
        literal: Option<&Value>,
        id_of: impl Fn(&InstanceAddress) -> Option<String>,
    ) -> Option<Value> {
        match self {
            Self::One(target) => id_of(target).map(Value::String),
            Self::Each(targets) => {
                let mut items = match literal {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                };
                for target in targets {
                    items.push(Value::String(id_of(target)?));
                }
                Some(Value::Array(items))
            }
        }
    }
}

/// User-declared desired state for one instance.
///
/// `references` name attributes filled with the controller ids of other
/// declared instances at apply time. `depends_on` adds ordering edges
/// without filling any attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub address: InstanceAddress,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<InstanceAddress>,
}

impl ResourceSpec {
    pub fn new(address: InstanceAddress) -> Self {
        Self {
            address,
            attributes: Attributes::new(),
            references: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.address.kind
    }

    /// Set an attribute value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Fill `attribute` with the id of `target` at apply time.
    pub fn reference(mut self, attribute: impl Into<String>, target: InstanceAddress) -> Self {
        self.references.insert(attribute.into(), Reference::One(target));
        self
    }

    /// Add the ids of `targets` to the list or set `attribute` at apply time.
    pub fn reference_each(
        mut self,
        attribute: impl Into<String>,
        targets: impl IntoIterator<Item = InstanceAddress>,
    ) -> Self {
        self.references
            .insert(attribute.into(), Reference::Each(targets.into_iter().collect()));
        self
    }

    pub fn depends_on(mut self, target: InstanceAddress) -> Self {
        self.depends_on.push(target);
        self
    }

    /// Every instance this one must be applied after, without duplicates.
    pub fn dependencies(&self) -> Vec<InstanceAddress> {
        let mut deps: Vec<InstanceAddress> = self
            .references
            .values()
            .flat_map(Reference::targets)
            .chain(self.depends_on.iter())
            .cloned()
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }
}
