// ── State mapper ──
//
// Translation between declared specs, controller wire bodies, and stored
// state. Pure functions: nothing here performs I/O.

use chrono::Utc;
use serde_json::Value;

use crate::error::ReconcileError;
use crate::model::{Attributes, ResourceSpec, ResourceState, SiteRef, StateKey};
use crate::schema::{Schema, normalize};
use crate::wire::WireBody;

/// Build the request payload for `spec`.
///
/// Computed attributes are never sent; absent optional attributes take
/// their declared default. The payload is decoded through the kind's wire
/// model, so values the controller could not accept fail here.
pub fn to_wire(schema: &Schema, spec: &ResourceSpec) -> Result<WireBody, ReconcileError> {
    let body: serde_json::Map<String, Value> =
        schema.with_defaults(&spec.attributes).into_iter().collect();

    WireBody::from_value(schema.kind, Value::Object(body)).map_err(|e| {
        ReconcileError::Validation {
            address: spec.address.clone(),
            message: format!("not representable as {}: {e}", schema.kind),
        }
    })
}

/// Interpret a controller response as stored state.
///
/// Schema attributes are normalized and kept in `attributes` (a JSON null
/// means absent); every other field is preserved verbatim in `extra`.
pub fn from_wire(
    schema: &Schema,
    body: &WireBody,
    site: &SiteRef,
) -> Result<ResourceState, ReconcileError> {
    let id = body
        .id()
        .ok_or_else(|| ReconcileError::Internal(format!("{} response has no _id", schema.kind)))?
        .to_owned();

    let Value::Object(fields) = body
        .to_value()
        .map_err(|e| ReconcileError::Internal(format!("re-encoding {} body: {e}", schema.kind)))?
    else {
        return Err(ReconcileError::Internal(format!(
            "{} body is not an object",
            schema.kind
        )));
    };

    let mut attributes = Attributes::new();
    let mut extra = serde_json::Map::new();
    for (name, value) in fields {
        if name == "_id" {
            continue;
        }
        if schema.attribute(&name).is_some() {
            if !value.is_null() {
                attributes.insert(name, normalize(&value));
            }
        } else {
            extra.insert(name, value);
        }
    }

    Ok(ResourceState {
        key: StateKey::new(schema.kind, site, id),
        attributes,
        extra,
        refreshed_at: Utc::now(),
    })
}

/// The value the controller would hold for `attribute` after applying a
/// declaration that omits it, or `None` when the attribute is unmanaged.
pub fn effective_value<'a>(
    schema: &'a Schema,
    declared: &'a Attributes,
    attribute: &str,
) -> Option<&'a Value> {
    declared
        .get(attribute)
        .filter(|v| !v.is_null())
        .or_else(|| schema.attribute(attribute).and_then(|a| a.default.as_ref()))
}
