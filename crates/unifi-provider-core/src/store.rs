// ── State store ──
//
// Persisted records keyed by instance address. The core only mutates it in
// memory; the driver decides where and how it is written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diff::LiveStates;
use crate::model::{Certainty, InstanceAddress, StateRecord};

/// Format version written alongside the records.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateStore {
    pub version: u32,
    /// Bumped on every commit.
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    records: BTreeMap<InstanceAddress, StateRecord>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            records: BTreeMap::new(),
        }
    }

    pub fn get(&self, address: &InstanceAddress) -> Option<&StateRecord> {
        self.records.get(address)
    }

    /// Insert or replace the record for its address.
    pub fn insert(&mut self, record: StateRecord) -> Option<StateRecord> {
        self.records.insert(record.address.clone(), record)
    }

    pub fn remove(&mut self, address: &InstanceAddress) -> Option<StateRecord> {
        self.records.remove(address)
    }

    pub fn records(&self) -> impl Iterator<Item = &StateRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fold refreshed live state in: found objects become known records,
    /// objects that are gone are dropped. Records `live` does not mention
    /// are left as they are.
    pub fn apply_refresh(&mut self, live: &LiveStates) {
        for (address, state) in live {
            match state {
                Some(state) => {
                    let (dependencies, identity) = self
                        .records
                        .get(address)
                        .map(|r| (r.dependencies.clone(), r.identity.clone()))
                        .unwrap_or_default();
                    self.insert(StateRecord {
                        address: address.clone(),
                        state: Some(state.clone()),
                        certainty: Certainty::Known,
                        dependencies,
                        identity,
                    });
                }
                None => {
                    self.records.remove(address);
                }
            }
        }
        self.serial += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{Attributes, ResourceKind, ResourceState, StateKey};

    fn addr(name: &str) -> InstanceAddress {
        InstanceAddress::new(ResourceKind::Network, name)
    }

    fn state(id: &str) -> ResourceState {
        ResourceState {
            key: StateKey {
                kind: ResourceKind::Network,
                controller: "https://10.0.0.1".into(),
                site: "default".into(),
                id: id.into(),
            },
            attributes: Attributes::new(),
            extra: serde_json::Map::new(),
            refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn serializes_records_keyed_by_address() {
        let mut store = StateStore::new();
        store.insert(StateRecord::known(addr("guest"), state("n1")));

        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(json["records"]["network.guest"]["state"]["key"]["id"], "n1");

        let back: StateStore = serde_json::from_value(json).unwrap();
        assert_eq!(back, store);
    }

    #[test]
    fn refresh_replaces_found_and_drops_missing() {
        let mut store = StateStore::new();
        let mut unknown = StateRecord::known(addr("a"), state("n1"));
        unknown.certainty = Certainty::Unknown;
        unknown.dependencies = vec![addr("z")];
        unknown.identity = Some(serde_json::json!("a"));
        store.insert(unknown);
        store.insert(StateRecord::known(addr("b"), state("n2")));
        let mut unresolved = StateRecord::known(addr("c"), state("n3"));
        unresolved.state = None;
        unresolved.certainty = Certainty::Unknown;
        store.insert(unresolved.clone());

        let mut live = LiveStates::new();
        live.insert(addr("a"), Some(state("n1")));
        live.insert(addr("b"), None);
        store.apply_refresh(&live);

        let a = store.get(&addr("a")).unwrap();
        assert_eq!(a.certainty, Certainty::Known);
        assert_eq!(a.dependencies, vec![addr("z")]);
        assert_eq!(a.identity, Some(serde_json::json!("a")));
        assert!(store.get(&addr("b")).is_none());
        // Not looked up, so still in doubt.
        assert_eq!(store.get(&addr("c")), Some(&unresolved));
        assert_eq!(store.serial, 1);
    }
}
