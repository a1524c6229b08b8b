// Machine and node inventory records.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machines keyed by id (sorted).
pub type MachineSnapshot = BTreeMap<String, MachineRecord>;

/// Nodes keyed by uid.
pub type NodeRecords = HashMap<String, NodeRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRecord {
    pub id: String,
    /// Uid of the node backing this machine, once it has one.
    pub node_uid: Option<String>,
    pub creation_timestamp: DateTime<Utc>,
    pub ready_timestamp: Option<DateTime<Utc>>,
}

impl MachineRecord {
    /// Owning group: the id up to its last '-'.
    pub fn owner_group(&self) -> &str {
        owner_group(&self.id)
    }
}

pub fn owner_group(machine_id: &str) -> &str {
    match machine_id.rfind('-') {
        Some(idx) => &machine_id[..idx],
        None => machine_id,
    }
}

/// Result of one machine listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineInventory {
    pub machines: MachineSnapshot,
    /// First image identifier found on the listed machines.
    pub boot_image_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub uid: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub observed_timestamp: DateTime<Utc>,
    pub ready_timestamp: Option<DateTime<Utc>>,
}

/// Cluster-wide node readiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounts {
    pub ready: usize,
    pub total: usize,
}

impl NodeCounts {
    pub fn all_ready(&self) -> bool {
        self.ready >= self.total
    }
}
