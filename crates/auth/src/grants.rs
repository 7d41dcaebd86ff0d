//! Resource → actions permission sets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Action, Resource};

/// One entry of a role's permission list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub resource: Resource,
    pub actions: BTreeSet<Action>,
}

/// A normalized set of (resource, action) grants.
///
/// Each resource appears at most once; granting more actions for a resource
/// unions them into the existing entry. Serialized as a list of
/// [`PermissionEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PermissionEntry>", into = "Vec<PermissionEntry>")]
pub struct PermissionSet {
    entries: BTreeMap<Resource, BTreeSet<Action>>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, resource: Resource, action: Action) {
        self.entries.entry(resource).or_default().insert(action);
    }

    pub fn grant_all(&mut self, resource: Resource, actions: impl IntoIterator<Item = Action>) {
        let slot = self.entries.entry(resource).or_default();
        slot.extend(actions);
        if slot.is_empty() {
            self.entries.remove(&resource);
        }
    }

    /// Builder-style [`grant_all`](Self::grant_all).
    pub fn with(mut self, resource: Resource, actions: impl IntoIterator<Item = Action>) -> Self {
        self.grant_all(resource, actions);
        self
    }

    /// Pure membership test. No action implies another.
    pub fn allows(&self, resource: Resource, action: Action) -> bool {
        self.entries
            .get(&resource)
            .is_some_and(|actions| actions.contains(&action))
    }

    pub fn merge(&mut self, other: &PermissionSet) {
        for (resource, actions) in &other.entries {
            self.grant_all(*resource, actions.iter().copied());
        }
    }

    pub fn actions_for(&self, resource: Resource) -> Option<&BTreeSet<Action>> {
        self.entries.get(&resource)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate every granted pair in (resource, action) order.
    pub fn pairs(&self) -> impl Iterator<Item = (Resource, Action)> + '_ {
        self.entries
            .iter()
            .flat_map(|(r, actions)| actions.iter().map(move |a| (*r, *a)))
    }

    pub fn entries(&self) -> Vec<PermissionEntry> {
        self.entries
            .iter()
            .map(|(resource, actions)| PermissionEntry {
                resource: *resource,
                actions: actions.clone(),
            })
            .collect()
    }
}

impl From<Vec<PermissionEntry>> for PermissionSet {
    fn from(value: Vec<PermissionEntry>) -> Self {
        value.into_iter().collect()
    }
}

impl From<PermissionSet> for Vec<PermissionEntry> {
    fn from(value: PermissionSet) -> Self {
        value.entries()
    }
}

impl FromIterator<PermissionEntry> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = PermissionEntry>>(iter: T) -> Self {
        let mut set = PermissionSet::new();
        for entry in iter {
            set.grant_all(entry.resource, entry.actions);
        }
        set
    }
}

impl FromIterator<(Resource, Action)> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = (Resource, Action)>>(iter: T) -> Self {
        let mut set = PermissionSet::new();
        for (resource, action) in iter {
            set.grant(resource, action);
        }
        set
    }
}
