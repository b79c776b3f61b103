// ── Diff engine ──
//
// Classifies each declared instance as create / update / replace / no-op by
// comparing desired attributes against the live object, and plans deletes
// for instances that are no longer declared.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::error::ReconcileError;
use crate::graph::{Cycle, DependencyGraph};
use crate::mapper::effective_value;
use crate::model::{
    Action, ChangeSet, FieldDiff, InstanceAddress, Operation, Reference, ResourceSpec,
    ResourceState, StateRecord,
};
use crate::schema::{Attribute, Schema, SchemaRegistry, normalize};
use crate::store::StateStore;

/// Live state per instance after a refresh; `None` when the object is gone.
pub type LiveStates = BTreeMap<InstanceAddress, Option<ResourceState>>;

/// What a reference attribute will hold once applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Known(Value),
    /// Some target is created or replaced in the same pass.
    AfterApply,
}

/// Controller ids of reference targets, as known at plan time.
#[derive(Debug, Clone, Default)]
pub struct Targets {
    ids: BTreeMap<InstanceAddress, String>,
    pending: BTreeSet<InstanceAddress>,
}

impl Targets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, target: InstanceAddress, id: impl Into<String>) -> Self {
        self.ids.insert(target, id.into());
        self
    }

    /// Mark `target` as getting a new id in this pass.
    pub fn mark_pending(&mut self, target: InstanceAddress) {
        self.pending.insert(target);
    }

    /// Value of a referencing attribute whose declared literal part is
    /// `literal`.
    pub fn resolve(&self, reference: &Reference, literal: Option<&Value>) -> Resolution {
        let id_of = |target: &InstanceAddress| {
            if self.pending.contains(target) {
                None
            } else {
                self.ids.get(target).cloned()
            }
        };
        reference
            .resolve(literal, id_of)
            .map_or(Resolution::AfterApply, Resolution::Known)
    }
}

/// Plan one declared instance.
///
/// Without `prior`, or when the live object is gone, the instance is
/// created. Otherwise `desired` is compared against `live`: absent optional
/// attributes compare as their default, attributes with neither a declared
/// value nor a default are left alone, computed attributes are ignored.
pub fn plan(
    schema: &Schema,
    desired: &ResourceSpec,
    prior: Option<&ResourceState>,
    live: Option<&ResourceState>,
    targets: &Targets,
) -> Operation {
    let references: BTreeMap<&str, Resolution> = desired
        .references
        .iter()
        .map(|(attr, reference)| {
            let literal = desired.attributes.get(attr);
            (attr.as_str(), targets.resolve(reference, literal))
        })
        .collect();

    let (Some(_), Some(live)) = (prior, live) else {
        return create(schema, desired, &references);
    };

    let mut field_diffs = BTreeMap::new();
    let mut needs_replace = false;

    for attr in schema.configurable() {
        let current = live
            .attributes
            .get(&attr.name)
            .filter(|v| !v.is_null())
            .or(attr.default.as_ref());

        let diff = match references.get(attr.name.as_str()) {
            Some(Resolution::AfterApply) => Some(FieldDiff::after_apply(current.cloned())),
            Some(Resolution::Known(value)) => compare(schema, attr, current, value),
            None => effective_value(schema, &desired.attributes, &attr.name)
                .and_then(|want| compare(schema, attr, current, want)),
        };

        if let Some(diff) = diff {
            needs_replace |= attr.force_new;
            field_diffs.insert(attr.name.clone(), diff);
        }
    }

    let action = if field_diffs.is_empty() {
        Action::NoOp
    } else if needs_replace {
        Action::Replace
    } else {
        Action::Update
    };

    Operation {
        kind: schema.kind,
        address: desired.address.clone(),
        action,
        id: Some(live.id().to_owned()),
        field_diffs,
    }
}

fn compare(
    schema: &Schema,
    attr: &Attribute,
    current: Option<&Value>,
    want: &Value,
) -> Option<FieldDiff> {
    match current {
        Some(current) if schema.values_equal(&attr.name, current, want) => None,
        _ => Some(FieldDiff::changed(current.cloned(), Some(normalize(want)))),
    }
}

fn create(
    schema: &Schema,
    desired: &ResourceSpec,
    references: &BTreeMap<&str, Resolution>,
) -> Operation {
    let mut field_diffs: BTreeMap<String, FieldDiff> = desired
        .attributes
        .iter()
        .filter(|(name, value)| {
            !value.is_null() && schema.attribute(name).is_some_and(|a| !a.is_computed())
        })
        .map(|(name, value)| (name.clone(), FieldDiff::changed(None, Some(normalize(value)))))
        .collect();

    for (attr, resolution) in references {
        let diff = match resolution {
            Resolution::Known(value) => FieldDiff::changed(None, Some(normalize(value))),
            Resolution::AfterApply => FieldDiff::after_apply(None),
        };
        field_diffs.insert((*attr).to_owned(), diff);
    }

    Operation {
        kind: schema.kind,
        address: desired.address.clone(),
        action: Action::Create,
        id: None,
        field_diffs,
    }
}

/// Plan a whole configuration against stored and live state.
///
/// Validates every spec, orders declared instances so dependencies come
/// first, and appends one `Delete` per stored record that is no longer
/// declared, dependents before their dependencies. `live` holds refreshed
/// state; an instance missing from it is planned against its stored state.
pub fn plan_all(
    registry: &SchemaRegistry,
    desired: &[ResourceSpec],
    prior: &StateStore,
    live: &LiveStates,
) -> Result<ChangeSet, ReconcileError> {
    let mut declared: BTreeMap<&InstanceAddress, &ResourceSpec> = BTreeMap::new();
    for spec in desired {
        if declared.insert(&spec.address, spec).is_some() {
            return Err(ReconcileError::Validation {
                address: spec.address.clone(),
                message: "declared more than once".into(),
            });
        }
        registry.describe(spec.kind())?.validate(spec)?;
    }

    let mut graph = DependencyGraph::new();
    for spec in desired {
        graph.add_node(spec.address.clone());
        for dependency in spec.dependencies() {
            if !declared.contains_key(&dependency) {
                return Err(ReconcileError::Validation {
                    address: spec.address.clone(),
                    message: format!("depends on undeclared instance {dependency}"),
                });
            }
            graph.add_edge(spec.address.clone(), dependency);
        }
    }
    let order = graph.topological_order().map_err(cycle_error)?;

    let mut targets = Targets::new();
    for address in declared.keys() {
        let record = prior.get(address);
        if let Some(state) = observed(live, address, record) {
            targets.ids.insert((*address).clone(), state.id().to_owned());
        }
    }

    let mut operations = Vec::with_capacity(desired.len());
    for address in &order {
        let Some(spec) = declared.get(address) else {
            continue;
        };
        let schema = registry.describe(spec.kind())?;
        let record = prior.get(address);
        let current = observed(live, address, record);
        // An interrupted create has no stored state; whatever a refresh
        // found under its identity counts as prior.
        let prior_state = record
            .and_then(|r| r.state.as_ref())
            .or_else(|| record.filter(|r| r.is_unknown()).and(current));

        let op = plan(schema, spec, prior_state, current, &targets);
        debug!(address = %op.address, action = %op.action, "planned");
        if matches!(op.action, Action::Create | Action::Replace) {
            targets.mark_pending(op.address.clone());
        }
        operations.push(op);
    }

    let mut orphans = DependencyGraph::new();
    for record in prior.records() {
        if declared.contains_key(&record.address) {
            continue;
        }
        orphans.add_node(record.address.clone());
        for dependency in &record.dependencies {
            orphans.add_edge(record.address.clone(), dependency.clone());
        }
    }
    for address in orphans.reverse_topological_order().map_err(cycle_error)? {
        let record = prior.get(&address);
        let id = observed(live, &address, record)
            .or_else(|| record.and_then(|r| r.state.as_ref()))
            .map(|s| s.id().to_owned());
        debug!(%address, "planned orphan delete");
        operations.push(Operation {
            kind: address.kind,
            address,
            action: Action::Delete,
            id,
            field_diffs: BTreeMap::new(),
        });
    }

    Ok(ChangeSet::new(operations))
}

/// Refreshed state when there is an entry for `address`, else stored state.
fn observed<'a>(
    live: &'a LiveStates,
    address: &InstanceAddress,
    record: Option<&'a StateRecord>,
) -> Option<&'a ResourceState> {
    match live.get(address) {
        Some(state) => state.as_ref(),
        None => record.and_then(|r| r.state.as_ref()),
    }
}

fn cycle_error(Cycle(nodes): Cycle) -> ReconcileError {
    let path = nodes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    match nodes.into_iter().next() {
        Some(address) => ReconcileError::Validation {
            address,
            message: format!("dependency cycle among {path}"),
        },
        None => ReconcileError::Internal("empty dependency cycle".into()),
    }
}
