// ── Domain model ──
//
// Identifiers, declared specs, observed state, and planned changes. These
// types are what the driver serializes and what the diff engine and
// reconciler pass between each other.

mod address;
mod change;
mod kind;
mod spec;
mod state;

pub use address::InstanceAddress;
pub use change::{Action, ChangeSet, ChangeSummary, FieldDiff, Operation};
pub use kind::ResourceKind;
pub use spec::{Reference, ResourceSpec};
pub use state::{Certainty, ResourceState, SiteRef, StateKey, StateRecord};

/// Attribute name -> value, as declared or as interpreted from the wire.
pub type Attributes = std::collections::BTreeMap<String, serde_json::Value>;
