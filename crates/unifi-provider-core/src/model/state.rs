use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Attributes, InstanceAddress, ResourceKind};

/// The controller and site a client talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteRef {
    /// Controller base URL.
    pub controller: String,
    pub site: String,
}

/// Identity of one remote object: `(kind, controller, site, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub kind: ResourceKind,
    pub controller: String,
    pub site: String,
    /// Controller-assigned `_id`.
    pub id: String,
}

impl StateKey {
    pub fn new(kind: ResourceKind, site: &SiteRef, id: impl Into<String>) -> Self {
        Self {
            kind,
            controller: site.controller.clone(),
            site: site.site.clone(),
            id: id.into(),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}/{}", self.kind, self.controller, self.site, self.id)
    }
}

/// Last observed remote representation of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub key: StateKey,
    /// Schema-known attributes, computed ones included.
    pub attributes: Attributes,
    /// Wire fields the schema does not know, kept verbatim.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub refreshed_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.key.kind
    }
}

/// Whether a record reflects the controller, or its last operation was
/// interrupted and the live object must be re-read before planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    #[default]
    Known,
    Unknown,
}

/// What is persisted per declared instance between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub address: InstanceAddress,
    pub state: Option<ResourceState>,
    #[serde(default)]
    pub certainty: Certainty,
    /// Instances this one depended on when last applied. Orders deletes
    /// once the declaration is gone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<InstanceAddress>,
    /// Value of the kind's identity attribute when last written. Lets an
    /// interrupted create be found again without its declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<serde_json::Value>,
}

impl StateRecord {
    pub fn known(address: InstanceAddress, state: ResourceState) -> Self {
        Self {
            address,
            state: Some(state),
            certainty: Certainty::Known,
            dependencies: Vec::new(),
            identity: None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.state.as_ref().map(ResourceState::id)
    }

    pub fn is_unknown(&self) -> bool {
        self.certainty == Certainty::Unknown
    }
}
