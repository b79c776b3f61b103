//! Desired-state reconciliation for UniFi controller resources.
//!
//! This crate sits between `unifi-provider-api` and the command-line driver:
//!
//! - **[`SchemaRegistry`]** describes each [`ResourceKind`]: attribute types,
//!   which are required, computed or force-new, and their defaults.
//!
//! - **[`mapper`]** translates a declared [`ResourceSpec`] into the typed
//!   [`WireBody`] the controller accepts, and a controller response back into
//!   a normalized [`ResourceState`].
//!
//! - **[`diff`]** compares declared, stored and live state into a
//!   [`ChangeSet`] of per-instance [`Operation`]s in dependency order.
//!
//! - **[`Reconciler`]** refreshes live state, plans, and applies a plan
//!   concurrently against a [`Controller`], reporting one [`Outcome`] per
//!   instance that [`ApplyReport::commit`] folds into the [`StateStore`].

pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod graph;
pub mod mapper;
pub mod model;
pub mod reconcile;
pub mod schema;
pub mod store;
pub mod wire;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{
    AuthCredentials, ControllerConfig, PlatformHint, ReconcileSettings, TlsVerification,
};
pub use controller::Controller;
pub use diff::{LiveStates, plan, plan_all};
pub use error::ReconcileError;
pub use graph::DependencyGraph;
pub use reconcile::{
    ApplyReport, InstanceReport, Lifecycle, Outcome, PartialState, Plan, Reconciler,
};
pub use schema::{AttrType, Attribute, Presence, Schema, SchemaRegistry, describe};
pub use store::{STATE_VERSION, StateStore};
pub use wire::WireBody;

pub use model::{
    Action, Attributes, Certainty, ChangeSet, ChangeSummary, FieldDiff, InstanceAddress,
    Operation, Reference, ResourceKind, ResourceSpec, ResourceState, SiteRef, StateKey, StateRecord,
};
