// Parsing of `-o json` output for machinesets, machines and nodes.
// Only the fields the benchmark reads are modelled.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::{GroupSize, MachineInventory, MachineRecord, NodeCounts, NodeRecord};

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct List<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    uid: String,
    creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MachineSet {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: MachineSetSpec,
    #[serde(default)]
    status: MachineSetStatus,
}

#[derive(Debug, Default, Deserialize)]
struct MachineSetSpec {
    #[serde(default)]
    replicas: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineSetStatus {
    #[serde(default)]
    ready_replicas: i32,
}

#[derive(Debug, Deserialize)]
struct Machine {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: MachineSpec,
    #[serde(default)]
    status: MachineStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineSpec {
    #[serde(default)]
    provider_spec: ProviderSpec,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderSpec {
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineStatus {
    phase: Option<String>,
    node_ref: Option<NodeRef>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct NodeRef {
    #[serde(default)]
    uid: String,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Debug, Default, Deserialize)]
struct NodeStatus {
    #[serde(default)]
    conditions: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Condition {
    #[serde(rename = "type")]
    type_: String,
    status: String,
    last_transition_time: Option<DateTime<Utc>>,
}

impl Node {
    /// When the Ready condition turned True, if it is True.
    fn ready_since(&self) -> Option<DateTime<Utc>> {
        self.status
            .conditions
            .iter()
            .find(|c| c.type_ == "Ready" && c.status == "True")
            .and_then(|c| c.last_transition_time)
    }
}

/// Machinesets with their requested replica counts, in listing order.
pub fn parse_machine_sets(json: &str) -> serde_json::Result<Vec<GroupSize>> {
    let list: List<MachineSet> = serde_json::from_str(json)?;
    Ok(list
        .items
        .into_iter()
        .map(|ms| GroupSize {
            name: ms.metadata.name,
            replicas: ms.spec.replicas,
        })
        .collect())
}

/// Ready replicas of a single machineset object.
pub fn parse_ready_replicas(json: &str) -> serde_json::Result<i32> {
    let ms: MachineSet = serde_json::from_str(json)?;
    Ok(ms.status.ready_replicas)
}

/// Machines (optionally only those created at or after `created_since`)
/// plus the boot image they were provisioned from.
pub fn parse_machines(
    json: &str,
    created_since: Option<DateTime<Utc>>,
) -> serde_json::Result<MachineInventory> {
    let list: List<Machine> = serde_json::from_str(json)?;
    let mut inventory = MachineInventory::default();
    for m in list.items {
        let Some(created) = m.metadata.creation_timestamp else {
            tracing::debug!(machine = %m.metadata.name, "machine without creationTimestamp skipped");
            continue;
        };
        if created_since.is_some_and(|since| created < since) {
            continue;
        }
        if inventory.boot_image_id.is_empty()
            && let Some(image) = boot_image_id(&m.spec.provider_spec.value)
        {
            inventory.boot_image_id = image;
        }
        let ready_timestamp = match m.status.phase.as_deref() {
            Some("Running") => m.status.last_updated,
            _ => None,
        };
        let node_uid = m
            .status
            .node_ref
            .map(|r| r.uid)
            .filter(|uid| !uid.is_empty());
        inventory.machines.insert(
            m.metadata.name.clone(),
            MachineRecord {
                id: m.metadata.name,
                node_uid,
                creation_timestamp: created,
                ready_timestamp,
            },
        );
    }
    Ok(inventory)
}

/// Image identifier from a machine provider spec: AWS AMI id, a plain image
/// name (GCP), an Azure image resource id, or a vSphere template.
fn boot_image_id(provider: &Value) -> Option<String> {
    let candidates = [
        provider.pointer("/ami/id"),
        provider.get("image"),
        provider.pointer("/image/resourceID"),
        provider.get("template"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn parse_nodes(json: &str) -> serde_json::Result<Vec<NodeRecord>> {
    let list: List<Node> = serde_json::from_str(json)?;
    Ok(list
        .items
        .into_iter()
        .filter_map(|n| {
            let ready_timestamp = n.ready_since();
            let observed = n.metadata.creation_timestamp?;
            Some(NodeRecord {
                uid: n.metadata.uid,
                name: n.metadata.name,
                labels: n.metadata.labels,
                observed_timestamp: observed,
                ready_timestamp,
            })
        })
        .collect())
}

pub fn parse_node_counts(json: &str) -> serde_json::Result<NodeCounts> {
    let list: List<Node> = serde_json::from_str(json)?;
    Ok(NodeCounts {
        ready: list.items.iter().filter(|n| is_ready(n)).count(),
        total: list.items.len(),
    })
}

fn is_ready(node: &Node) -> bool {
    node.status
        .conditions
        .iter()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}
