use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use super::{InstanceAddress, ResourceKind};

/// What the reconciler will do to one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    /// Delete then create; the create only runs if the delete succeeded.
    Replace,
    Delete,
    NoOp,
}

impl Action {
    pub fn is_change(self) -> bool {
        self != Self::NoOp
    }
}

/// Old and new value of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub old: Option<Value>,
    pub new: Option<Value>,
    /// The new value is the id of an instance that is created or replaced
    /// in the same pass, so it is only known after apply.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub known_after_apply: bool,
}

impl FieldDiff {
    pub fn changed(old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            old,
            new,
            known_after_apply: false,
        }
    }

    pub fn after_apply(old: Option<Value>) -> Self {
        Self {
            old,
            new: None,
            known_after_apply: true,
        }
    }
}

/// One planned step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: ResourceKind,
    pub address: InstanceAddress,
    pub action: Action,
    /// Controller id of the object acted on; `None` for creates.
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_diffs: BTreeMap<String, FieldDiff>,
}

/// Operations in execution order: declared instances in dependency order,
/// then deletes of orphaned instances in reverse dependency order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    operations: Vec<Operation>,
}

impl ChangeSet {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn get(&self, address: &InstanceAddress) -> Option<&Operation> {
        self.operations.iter().find(|op| &op.address == address)
    }

    /// Whether applying would touch the controller at all.
    pub fn has_changes(&self) -> bool {
        self.operations.iter().any(|op| op.action.is_change())
    }

    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for op in &self.operations {
            match op.action {
                Action::Create => summary.create += 1,
                Action::Update => summary.update += 1,
                Action::Replace => summary.replace += 1,
                Action::Delete => summary.delete += 1,
                Action::NoOp => summary.unchanged += 1,
            }
        }
        summary
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

impl IntoIterator for ChangeSet {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

/// Per-action counts, for plan output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub unchanged: usize,
}
