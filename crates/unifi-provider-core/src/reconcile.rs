// ── Reconciler ──
//
// Drives a change set through the controller. Declared instances run first,
// each only after everything it depends on has applied; deletes of
// undeclared instances run afterwards, dependents before dependencies.
// Independent instances run concurrently on a `JoinSet`, bounded by a
// semaphore.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unifi_provider_api::Error as ApiError;
use uuid::Uuid;

use crate::controller::Controller;
use crate::diff::{LiveStates, plan_all};
use crate::error::ReconcileError;
use crate::graph::DependencyGraph;
use crate::mapper::{from_wire, to_wire};
use crate::model::{
    Action, Certainty, ChangeSet, InstanceAddress, Operation, ResourceKind, ResourceSpec,
    ResourceState, StateRecord,
};
use crate::schema::{Schema, SchemaRegistry};
use crate::store::StateStore;

// ── Per-instance state machine ───────────────────────────────────────

/// Where one instance is in its apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Lifecycle {
    Planned,
    Applying,
    Applied,
    Failed,
}

impl Lifecycle {
    /// Move to `next`, rejecting transitions the machine does not have.
    ///
    /// `Planned -> Failed` covers instances that never start (a dependency
    /// failed, or the run was cancelled first).
    pub fn transition(self, next: Lifecycle) -> Result<Lifecycle, ReconcileError> {
        match (self, next) {
            (Self::Planned, Self::Applying | Self::Failed)
            | (Self::Applying, Self::Applied | Self::Failed) => Ok(next),
            _ => Err(ReconcileError::Internal(format!(
                "illegal lifecycle transition {self} -> {next}"
            ))),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Failed)
    }
}

/// What is known about a failed instance on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PartialState {
    /// Nothing changed; the stored state still holds.
    Unchanged,
    /// The old object was deleted and no replacement exists.
    Absent,
    /// The outcome is not known; the next run must re-read live state.
    Unknown,
}

#[derive(Debug)]
pub enum Outcome {
    /// New state as confirmed by the controller; `None` after a delete.
    Applied { state: Option<ResourceState> },
    Failed {
        partial: PartialState,
        error: ReconcileError,
    },
}

/// Final report for one instance.
#[derive(Debug)]
pub struct InstanceReport {
    pub address: InstanceAddress,
    pub action: Action,
    pub lifecycle: Lifecycle,
    pub outcome: Outcome,
    dependencies: Vec<InstanceAddress>,
    prior: Option<ResourceState>,
    identity: Option<Value>,
}

impl InstanceReport {
    pub fn kind(&self) -> ResourceKind {
        self.address.kind
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, Outcome::Applied { .. })
    }

    /// Controller id after the run, or the id acted on when it failed.
    pub fn id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Applied { state } => state.as_ref().map(ResourceState::id),
            Outcome::Failed { .. } => self.prior.as_ref().map(ResourceState::id),
        }
    }

    pub fn error(&self) -> Option<&ReconcileError> {
        match &self.outcome {
            Outcome::Failed { error, .. } => Some(error),
            Outcome::Applied { .. } => None,
        }
    }
}

// ── Plans & reports ──────────────────────────────────────────────────

/// A change set plus what is needed to execute it.
#[derive(Debug, Clone)]
pub struct Plan {
    pub changes: ChangeSet,
    /// Live state read while planning.
    pub live: LiveStates,
    specs: BTreeMap<InstanceAddress, ResourceSpec>,
    prior: BTreeMap<InstanceAddress, StateRecord>,
}

impl Plan {
    /// Plan against stored state only, without reading the controller.
    pub fn offline(
        registry: &SchemaRegistry,
        specs: Vec<ResourceSpec>,
        store: &StateStore,
    ) -> Result<Self, ReconcileError> {
        Self::build(registry, specs, store, LiveStates::new())
    }

    fn build(
        registry: &SchemaRegistry,
        specs: Vec<ResourceSpec>,
        store: &StateStore,
        live: LiveStates,
    ) -> Result<Self, ReconcileError> {
        let changes = plan_all(registry, &specs, store, &live)?;
        let prior = store
            .records()
            .map(|r| (r.address.clone(), r.clone()))
            .collect();
        let specs = specs.into_iter().map(|s| (s.address.clone(), s)).collect();
        Ok(Self {
            changes,
            live,
            specs,
            prior,
        })
    }

    pub fn spec(&self, address: &InstanceAddress) -> Option<&ResourceSpec> {
        self.specs.get(address)
    }

    /// State the instance is planned against: refreshed if read, else stored.
    fn current(&self, address: &InstanceAddress) -> Option<&ResourceState> {
        match self.live.get(address) {
            Some(state) => state.as_ref(),
            None => self.prior.get(address).and_then(|r| r.state.as_ref()),
        }
    }

    fn dependencies(&self, address: &InstanceAddress) -> Vec<InstanceAddress> {
        match self.specs.get(address) {
            Some(spec) => spec.dependencies(),
            None => self
                .prior
                .get(address)
                .map(|r| r.dependencies.clone())
                .unwrap_or_default(),
        }
    }
}

/// Outcome of one apply run.
#[derive(Debug)]
pub struct ApplyReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In change-set order.
    pub instances: Vec<InstanceReport>,
}

impl ApplyReport {
    pub fn applied(&self) -> impl Iterator<Item = &InstanceReport> {
        self.instances.iter().filter(|r| r.is_applied())
    }

    pub fn failed(&self) -> impl Iterator<Item = &InstanceReport> {
        self.instances.iter().filter(|r| !r.is_applied())
    }

    pub fn is_success(&self) -> bool {
        self.instances.iter().all(InstanceReport::is_applied)
    }

    pub fn get(&self, address: &InstanceAddress) -> Option<&InstanceReport> {
        self.instances.iter().find(|r| &r.address == address)
    }

    /// Fold outcomes into `store`. Applied instances are committed even
    /// when others failed.
    pub fn commit(&self, store: &mut StateStore) {
        for report in &self.instances {
            let record = |state, certainty| StateRecord {
                address: report.address.clone(),
                state,
                certainty,
                dependencies: report.dependencies.clone(),
                identity: report.identity.clone(),
            };
            match &report.outcome {
                Outcome::Applied { state: Some(state) } => {
                    store.insert(record(Some(state.clone()), Certainty::Known));
                }
                Outcome::Applied { state: None } => {
                    store.remove(&report.address);
                }
                Outcome::Failed {
                    partial: PartialState::Unchanged,
                    ..
                } => {}
                Outcome::Failed {
                    partial: PartialState::Absent,
                    ..
                } => {
                    store.insert(record(None, Certainty::Known));
                }
                Outcome::Failed {
                    partial: PartialState::Unknown,
                    error,
                } => {
                    // After a replace deleted the old object its id is stale.
                    let state = match error {
                        ReconcileError::PartialFailure { .. } => None,
                        _ => report.prior.clone(),
                    };
                    store.insert(record(state, Certainty::Unknown));
                }
            }
        }
        store.serial += 1;
    }
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let applied = self.applied().count();
        let failed = self.instances.len() - applied;
        write!(f, "run {}: {applied} applied, {failed} failed", self.run_id)
    }
}

// ── Reconciler ───────────────────────────────────────────────────────

pub struct Reconciler {
    controller: Arc<Controller>,
    registry: SchemaRegistry,
    max_concurrency: usize,
}

/// Work item for one instance.
struct Job {
    op: Operation,
    schema: Schema,
    spec: Option<ResourceSpec>,
    prior: Option<ResourceState>,
    dependencies: Vec<InstanceAddress>,
    /// Identity attribute value, declared or recorded.
    identity: Option<Value>,
    /// The stored record is unknown and was not re-read while planning.
    in_doubt: bool,
}

impl Job {
    /// Copy of the bookkeeping fields, kept while the job itself is in flight.
    fn summary(&self) -> Job {
        Job {
            op: self.op.clone(),
            schema: self.schema.clone(),
            spec: None,
            prior: self.prior.clone(),
            dependencies: self.dependencies.clone(),
            identity: self.identity.clone(),
            in_doubt: self.in_doubt,
        }
    }
}

impl Reconciler {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self {
            controller,
            registry: SchemaRegistry::builtin(),
            max_concurrency: 4,
        }
    }

    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Read live state for every stored record.
    ///
    /// Records with an id are read by id. Records whose last operation was
    /// interrupted are also looked up by identity attribute when the id is
    /// missing or no longer resolves; the identity value is the one recorded
    /// with the record, else the matching declaration's in `specs`. An
    /// interrupted record with neither is left out of the result. Any read
    /// failure aborts the refresh.
    pub async fn refresh(
        &self,
        store: &StateStore,
        specs: &[ResourceSpec],
        cancel: &CancellationToken,
    ) -> Result<LiveStates, ReconcileError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set = JoinSet::new();

        for record in store.records() {
            let schema = self.registry.describe(record.address.kind)?.clone();
            let identity = if record.is_unknown() {
                record.identity.clone().or_else(|| {
                    specs
                        .iter()
                        .find(|s| s.address == record.address)
                        .and_then(|s| s.attributes.get(&schema.identity))
                        .cloned()
                })
            } else {
                None
            };
            let id = record.id().map(str::to_owned);
            if record.is_unknown() && id.is_none() && identity.is_none() {
                warn!(
                    address = %record.address,
                    "interrupted create has no id or identity to look it up by; left unknown"
                );
                continue;
            }
            let address = record.address.clone();
            let controller = Arc::clone(&self.controller);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ReconcileError::Internal(e.to_string()))?;
                let state =
                    read_live(&controller, &schema, id.as_deref(), identity.as_ref(), &cancel)
                        .await?;
                Ok::<_, ReconcileError>((address, state))
            });
        }

        let mut live = LiveStates::new();
        while let Some(joined) = set.join_next().await {
            let (address, state) = joined
                .map_err(|e| ReconcileError::Internal(format!("refresh task failed: {e}")))??;
            debug!(%address, found = state.is_some(), "refreshed");
            live.insert(address, state);
        }
        Ok(live)
    }

    /// Refresh, then diff `specs` against the result.
    pub async fn plan(
        &self,
        store: &StateStore,
        specs: Vec<ResourceSpec>,
        cancel: &CancellationToken,
    ) -> Result<Plan, ReconcileError> {
        let live = self.refresh(store, &specs, cancel).await?;
        let plan = Plan::build(&self.registry, specs, store, live)?;
        let summary = plan.changes.summary();
        info!(
            create = summary.create,
            update = summary.update,
            replace = summary.replace,
            delete = summary.delete,
            unchanged = summary.unchanged,
            "plan ready"
        );
        Ok(plan)
    }

    // ── Apply ────────────────────────────────────────────────────────

    /// Execute `plan`. Never fails as a whole: every instance gets a report.
    pub async fn apply(&self, plan: &Plan, cancel: &CancellationToken) -> ApplyReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, operations = plan.changes.len(), "apply started");

        let mut declared = Vec::new();
        let mut deletes = Vec::new();
        let mut reports = BTreeMap::new();
        // Cancelled on a fatal error so nothing further is started.
        let run = cancel.child_token();
        for op in &plan.changes {
            match self.job(plan, op) {
                Ok(job) if op.action == Action::Delete => deletes.push(job),
                Ok(job) => declared.push(job),
                Err(error) => {
                    warn!(address = %op.address, %error, "cannot schedule");
                    reports.insert(
                        op.address.clone(),
                        InstanceReport {
                            address: op.address.clone(),
                            action: op.action,
                            lifecycle: Lifecycle::Failed,
                            outcome: Outcome::Failed {
                                partial: PartialState::Unchanged,
                                error,
                            },
                            dependencies: Vec::new(),
                            prior: None,
                            identity: None,
                        },
                    );
                }
            }
        }

        // Declared instances: wait for dependencies.
        let mut forward = DependencyGraph::new();
        for job in &declared {
            forward.add_node(job.op.address.clone());
            for dep in &job.dependencies {
                forward.add_edge(job.op.address.clone(), dep.clone());
            }
        }
        let mut ids: BTreeMap<InstanceAddress, String> = plan
            .specs
            .keys()
            .filter_map(|a| plan.current(a).map(|s| (a.clone(), s.id().to_owned())))
            .collect();
        reports.extend(self.run_phase(declared, &forward, &mut ids, &run).await);

        // Deletes: wait for dependents.
        let mut backward = DependencyGraph::new();
        for job in &deletes {
            backward.add_node(job.op.address.clone());
        }
        for job in &deletes {
            for dep in &job.dependencies {
                if backward.contains(dep) {
                    backward.add_edge(dep.clone(), job.op.address.clone());
                }
            }
        }
        reports.extend(self.run_phase(deletes, &backward, &mut ids, &run).await);

        let instances = plan
            .changes
            .iter()
            .filter_map(|op| reports.remove(&op.address))
            .collect();
        let report = ApplyReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            instances,
        };
        info!("{report}");
        report
    }

    fn job(&self, plan: &Plan, op: &Operation) -> Result<Job, ReconcileError> {
        let schema = self.registry.describe(op.kind)?.clone();
        let spec = plan.spec(&op.address).cloned();
        let record = plan.prior.get(&op.address);
        let identity = spec
            .as_ref()
            .and_then(|s| s.attributes.get(&schema.identity))
            .or_else(|| record.and_then(|r| r.identity.as_ref()))
            .cloned();
        let in_doubt =
            record.is_some_and(StateRecord::is_unknown) && !plan.live.contains_key(&op.address);
        Ok(Job {
            op: op.clone(),
            schema,
            spec,
            prior: plan.current(&op.address).cloned(),
            dependencies: plan.dependencies(&op.address),
            identity,
            in_doubt,
        })
    }

    /// Run jobs as their prerequisites (graph edges) finish.
    async fn run_phase(
        &self,
        jobs: Vec<Job>,
        graph: &DependencyGraph,
        ids: &mut BTreeMap<InstanceAddress, String>,
        cancel: &CancellationToken,
    ) -> BTreeMap<InstanceAddress, InstanceReport> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set: JoinSet<(Job, Outcome)> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, InstanceAddress> = HashMap::new();
        let mut lifecycle: BTreeMap<InstanceAddress, Lifecycle> = BTreeMap::new();
        let mut waiting: BTreeMap<InstanceAddress, Job> = BTreeMap::new();
        let mut running: BTreeMap<InstanceAddress, Job> = BTreeMap::new();
        let mut done: BTreeMap<InstanceAddress, InstanceReport> = BTreeMap::new();

        for job in jobs {
            lifecycle.insert(job.op.address.clone(), Lifecycle::Planned);
            waiting.insert(job.op.address.clone(), job);
        }

        loop {
            // Start everything whose prerequisites are settled.
            let ready: Vec<InstanceAddress> = waiting
                .keys()
                .filter(|a| graph.dependencies(a).all(|d| done.contains_key(d)))
                .cloned()
                .collect();

            for address in ready {
                let Some(job) = waiting.remove(&address) else {
                    continue;
                };
                let failed_dep = graph
                    .dependencies(&address)
                    .find(|d| done.get(*d).is_some_and(|r| !r.is_applied()))
                    .cloned();

                let skip = match failed_dep {
                    Some(dependency) => Some(ReconcileError::DependencyFailed {
                        address: address.clone(),
                        dependency,
                    }),
                    None if cancel.is_cancelled() => Some(ReconcileError::Cancelled),
                    None => None,
                };
                if let Some(error) = skip {
                    warn!(%address, %error, "not applied");
                    let state = advance(&mut lifecycle, &address, Lifecycle::Failed);
                    done.insert(
                        address,
                        report(
                            job,
                            state,
                            Outcome::Failed {
                                partial: PartialState::Unchanged,
                                error,
                            },
                        ),
                    );
                    continue;
                }

                let resolved = match resolve_references(&job, ids) {
                    Ok(resolved) => resolved,
                    Err(error) => {
                        let state = advance(&mut lifecycle, &address, Lifecycle::Failed);
                        let outcome = Outcome::Failed {
                            partial: PartialState::Unchanged,
                            error,
                        };
                        done.insert(address, report(job, state, outcome));
                        continue;
                    }
                };

                advance(&mut lifecycle, &address, Lifecycle::Applying);
                debug!(%address, action = %job.op.action, "applying");
                running.insert(address.clone(), job.summary());

                let controller = Arc::clone(&self.controller);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let handle = set.spawn(async move {
                    let permit = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        permit = semaphore.acquire_owned() => permit.ok(),
                    };
                    let outcome = match permit {
                        Some(_permit) => execute(&controller, &job, resolved, &cancel).await,
                        None => Outcome::Failed {
                            partial: PartialState::Unchanged,
                            error: ReconcileError::Cancelled,
                        },
                    };
                    (job, outcome)
                });
                in_flight.insert(handle.id(), address);
            }

            let Some(joined) = set.join_next_with_id().await else {
                break;
            };

            match joined {
                Ok((task_id, (job, outcome))) => {
                    in_flight.remove(&task_id);
                    let address = job.op.address.clone();
                    running.remove(&address);
                    let next = match &outcome {
                        Outcome::Applied { state } => {
                            if let Some(state) = state {
                                ids.insert(address.clone(), state.id().to_owned());
                            }
                            info!(%address, action = %job.op.action, "applied");
                            Lifecycle::Applied
                        }
                        Outcome::Failed { partial, error } => {
                            warn!(%address, action = %job.op.action, %partial, %error, "failed");
                            if error.is_fatal() && !cancel.is_cancelled() {
                                warn!("stopping run after fatal error");
                                cancel.cancel();
                            }
                            Lifecycle::Failed
                        }
                    };
                    let state = advance(&mut lifecycle, &address, next);
                    done.insert(address, report(job, state, outcome));
                }
                Err(join_error) => {
                    let Some(address) = in_flight.remove(&join_error.id()) else {
                        continue;
                    };
                    let Some(job) = running.remove(&address) else {
                        continue;
                    };
                    let state = advance(&mut lifecycle, &address, Lifecycle::Failed);
                    warn!(%address, %join_error, "apply task aborted");
                    let outcome = Outcome::Failed {
                        partial: PartialState::Unknown,
                        error: ReconcileError::Internal(format!("apply task aborted: {join_error}")),
                    };
                    done.insert(address, report(job, state, outcome));
                }
            }
        }

        // Anything still waiting sits on a cycle; planning rejects those.
        for (address, job) in waiting {
            let state = advance(&mut lifecycle, &address, Lifecycle::Failed);
            let outcome = Outcome::Failed {
                partial: PartialState::Unchanged,
                error: ReconcileError::Internal(format!("{address} was never scheduled")),
            };
            done.insert(address, report(job, state, outcome));
        }

        done
    }
}

fn advance(
    lifecycle: &mut BTreeMap<InstanceAddress, Lifecycle>,
    address: &InstanceAddress,
    next: Lifecycle,
) -> Lifecycle {
    let Some(current) = lifecycle.get_mut(address) else {
        return next;
    };
    match current.transition(next) {
        Ok(state) => *current = state,
        Err(error) => warn!(%address, %error, "lifecycle"),
    }
    *current
}

fn report(job: Job, lifecycle: Lifecycle, outcome: Outcome) -> InstanceReport {
    InstanceReport {
        address: job.op.address,
        action: job.op.action,
        lifecycle,
        outcome,
        dependencies: job.dependencies,
        prior: job.prior,
        identity: job.identity,
    }
}

/// Values for the job's reference attributes, from instances already applied.
fn resolve_references(
    job: &Job,
    ids: &BTreeMap<InstanceAddress, String>,
) -> Result<BTreeMap<String, Value>, ReconcileError> {
    let Some(spec) = &job.spec else {
        return Ok(BTreeMap::new());
    };
    spec.references
        .iter()
        .map(|(attr, reference)| {
            reference
                .resolve(spec.attributes.get(attr), |target| ids.get(target).cloned())
                .map(|value| (attr.clone(), value))
                .ok_or_else(|| {
                    ReconcileError::Internal(format!(
                        "{}.{attr} references an instance with no id",
                        spec.address
                    ))
                })
        })
        .collect()
}

// ── Per-instance execution ───────────────────────────────────────────

/// Whether a failed write may have landed anyway.
fn is_ambiguous(err: &ApiError) -> bool {
    let root = err.root();
    matches!(root, ApiError::Cancelled) || (root.is_transient() && !root.is_not_applied())
}

fn classify(err: ApiError, otherwise: PartialState) -> (PartialState, ReconcileError) {
    let partial = if is_ambiguous(&err) {
        PartialState::Unknown
    } else {
        otherwise
    };
    (partial, err.into())
}

fn failed(err: ApiError, otherwise: PartialState) -> Outcome {
    let (partial, error) = classify(err, otherwise);
    Outcome::Failed { partial, error }
}

async fn execute(
    controller: &Controller,
    job: &Job,
    resolved: BTreeMap<String, Value>,
    cancel: &CancellationToken,
) -> Outcome {
    let address = &job.op.address;
    let unchanged = |error| Outcome::Failed {
        partial: PartialState::Unchanged,
        error,
    };

    // Delete & no-op need no payload.
    match job.op.action {
        Action::NoOp => {
            return Outcome::Applied {
                state: job.prior.clone(),
            };
        }
        Action::Delete => {
            let id = match (job.op.id.clone(), job.in_doubt) {
                (Some(id), _) => id,
                (None, true) => match locate(controller, job, cancel).await {
                    Ok(Some(id)) => id,
                    Ok(None) => return Outcome::Applied { state: None },
                    Err(outcome) => return outcome,
                },
                (None, false) => return Outcome::Applied { state: None },
            };
            return match controller.delete(job.op.kind, &id, cancel).await {
                Ok(()) => Outcome::Applied { state: None },
                Err(e) => failed(e, PartialState::Unchanged),
            };
        }
        Action::Create | Action::Update | Action::Replace => {}
    }

    let Some(spec) = &job.spec else {
        return unchanged(ReconcileError::Internal(format!("{address} has no declaration")));
    };
    let mut spec = spec.clone();
    for (attr, value) in resolved {
        spec.attributes.insert(attr, value);
    }
    let body = match to_wire(&job.schema, &spec) {
        Ok(body) => body,
        Err(e) => return unchanged(e),
    };
    let site = controller.site();
    let confirmed = |body| match from_wire(&job.schema, &body, site) {
        Ok(state) => Outcome::Applied { state: Some(state) },
        // The write landed but its echo is unusable; re-read next run.
        Err(error) => Outcome::Failed {
            partial: PartialState::Unknown,
            error,
        },
    };

    match (job.op.action, job.op.id.as_deref()) {
        (Action::Create, _) => match controller.create(&body, cancel).await {
            Ok(created) => confirmed(created),
            Err(e) => failed(e, PartialState::Unchanged),
        },
        (Action::Update, Some(id)) => match controller.update(id, &body, cancel).await {
            Ok(updated) => confirmed(updated),
            Err(e) => failed(e, PartialState::Unchanged),
        },
        (Action::Replace, Some(id)) => {
            if let Err(e) = controller.delete(job.op.kind, id, cancel).await {
                return failed(e, PartialState::Unchanged);
            }
            debug!(%address, deleted = id, "old object removed, creating replacement");
            match controller.create(&body, cancel).await {
                Ok(created) => confirmed(created),
                Err(e) => {
                    let (partial, error) = classify(e, PartialState::Absent);
                    Outcome::Failed {
                        partial,
                        error: ReconcileError::PartialFailure {
                            address: address.clone(),
                            deleted_id: id.to_owned(),
                            source: Box::new(error),
                        },
                    }
                }
            }
        }
        (action, _) => unchanged(ReconcileError::Internal(format!(
            "{address}: {action} without a controller id"
        ))),
    }
}

/// Controller id of an interrupted create that was never re-read.
async fn locate(
    controller: &Controller,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<Option<String>, Outcome> {
    let Some(value) = &job.identity else {
        return Err(Outcome::Failed {
            partial: PartialState::Unknown,
            error: ReconcileError::Validation {
                address: job.op.address.clone(),
                message: format!(
                    "interrupted create left no id or {} to find it by",
                    job.schema.identity
                ),
            },
        });
    };
    debug!(address = %job.op.address, %value, "locating interrupted create");
    match controller
        .find(job.op.kind, &job.schema.identity, value, cancel)
        .await
    {
        Ok(found) => Ok(found.and_then(|body| body.id().map(str::to_owned))),
        Err(e) => Err(failed(e, PartialState::Unknown)),
    }
}

/// Read one object's live state by id, falling back to its identity value.
async fn read_live(
    controller: &Controller,
    schema: &Schema,
    id: Option<&str>,
    identity: Option<&Value>,
    cancel: &CancellationToken,
) -> Result<Option<ResourceState>, ReconcileError> {
    let mut body = None;
    if let Some(id) = id {
        body = controller.read(schema.kind, id, cancel).await?;
    }
    if body.is_none() {
        if let Some(value) = identity {
            debug!(kind = %schema.kind, identity = %schema.identity, %value, "looking up by identity");
            body = controller
                .find(schema.kind, &schema.identity, value, cancel)
                .await?;
        }
    }
    body.map(|b| from_wire(schema, &b, controller.site()))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_allows_only_forward_transitions() {
        use Lifecycle::{Applied, Applying, Failed, Planned};

        assert_eq!(Planned.transition(Applying).ok(), Some(Applying));
        assert_eq!(Applying.transition(Applied).ok(), Some(Applied));
        assert_eq!(Applying.transition(Failed).ok(), Some(Failed));
        assert_eq!(Planned.transition(Failed).ok(), Some(Failed));

        assert!(Planned.transition(Applied).is_err());
        assert!(Applied.transition(Applying).is_err());
        assert!(Failed.transition(Applied).is_err());
        assert!(Applied.is_terminal() && Failed.is_terminal());
        assert!(!Applying.is_terminal());
    }

    #[test]
    fn ambiguity_follows_the_failure_kind() {
        assert!(is_ambiguous(&ApiError::Cancelled));
        assert!(is_ambiguous(&ApiError::Timeout {
            timeout: std::time::Duration::from_secs(1)
        }));
        assert!(is_ambiguous(&ApiError::Http {
            status: 500,
            message: String::new()
        }));
        assert!(!is_ambiguous(&ApiError::RateLimited {
            retry_after_secs: None
        }));
        assert!(!is_ambiguous(&ApiError::LegacyApi {
            message: "api.err.InvalidPayload".into(),
            field: None,
            status: 400
        }));
    }
}
