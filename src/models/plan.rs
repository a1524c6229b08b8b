// Scale plan: one GroupEdit per node-group the distributor touched.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Size buckets: replica count -> group names in listing order.
pub type SizeBuckets = BTreeMap<i32, Vec<String>>;

/// A node-group as reported by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSize {
    pub name: String,
    pub replicas: i32,
}

/// Planned growth of a single group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEdit {
    pub name: String,
    pub previous_size: i32,
    pub target_size: i32,
    /// Set by the waiter right before polling starts.
    #[serde(default)]
    pub trigger_timestamp: Option<DateTime<Utc>>,
}

impl GroupEdit {
    pub fn growth(&self) -> i32 {
        self.target_size - self.previous_size
    }
}

/// Owned plan table keyed by group name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalePlan {
    edits: HashMap<String, GroupEdit>,
}

impl ScalePlan {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            edits: HashMap::with_capacity(capacity),
        }
    }

    /// Raises `name` to `size + 1`, saturating. The first touch fixes `previous_size`.
    pub(crate) fn bump(&mut self, name: &str, size: i32) {
        let target = size.saturating_add(1);
        self.edits
            .entry(name.to_string())
            .and_modify(|e| e.target_size = target)
            .or_insert_with(|| GroupEdit {
                name: name.to_string(),
                previous_size: size,
                target_size: target,
                trigger_timestamp: None,
            });
    }

    /// Records the trigger time into every edit.
    pub fn stamp_trigger(&mut self, at: DateTime<Utc>) {
        for edit in self.edits.values_mut() {
            edit.trigger_timestamp = Some(at);
        }
    }

    pub fn get(&self, name: &str) -> Option<&GroupEdit> {
        self.edits.get(name)
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Sum of (target - previous) over every edit.
    pub fn total_growth(&self) -> i64 {
        self.edits.values().map(|e| e.growth() as i64).sum()
    }

    /// Edits sorted by group name.
    pub fn sorted(&self) -> Vec<&GroupEdit> {
        let mut out: Vec<&GroupEdit> = self.edits.values().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Applies the plan to `buckets`: each edited group moves from its
    /// previous bucket to its target bucket.
    pub fn apply_to(&self, buckets: &SizeBuckets) -> SizeBuckets {
        let mut out = SizeBuckets::new();
        for (size, names) in buckets {
            for name in names {
                let size = self.get(name).map_or(*size, |e| e.target_size);
                out.entry(size).or_default().push(name.clone());
            }
        }
        out
    }
}

impl FromIterator<GroupEdit> for ScalePlan {
    fn from_iter<T: IntoIterator<Item = GroupEdit>>(iter: T) -> Self {
        Self {
            edits: iter.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }
}

/// Builds size buckets from the inventory listing, keeping listing order.
pub fn group_sizes_by_replicas(groups: &[GroupSize]) -> SizeBuckets {
    let mut buckets = SizeBuckets::new();
    for g in groups {
        buckets.entry(g.replicas).or_default().push(g.name.clone());
    }
    buckets
}
