// Shared test helpers: an in-memory cluster and a recording sink.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use workers_scale::cluster::{ControlSurface, GroupStatus, Inventory, NodeReadiness};
use workers_scale::error::ClusterError;
use workers_scale::models::*;
use workers_scale::scenario::{Scenario, ScenarioSettings};
use workers_scale::sink::{MetricBatch, MetricsSink};
use workers_scale::waiter::WaitOptions;

pub const WORKLOAD_NAME: &str = "work-queue-abcde";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ApplyGroupPolicy(String, i32),
    RemoveGroupPolicy(String),
    ApplyClusterPolicy(i32),
    RemoveClusterPolicy,
    CreateWorkload,
    DeleteWorkload(String),
    Resize(String, i32),
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub groups: Vec<GroupSize>,
    /// Returned by the first machine listing.
    pub before: MachineInventory,
    /// Returned by every later listing.
    pub after: MachineInventory,
    pub machine_listings: usize,
    pub nodes: Vec<NodeRecord>,
    pub node_counts: NodeCounts,
    pub ready: HashMap<String, i32>,
    /// Groups whose ready count never moves.
    pub stuck: HashSet<String>,
    /// Groups whose status query errors.
    pub broken: HashSet<String>,
    /// Operation names that fail, e.g. "resize_group".
    pub failing: HashSet<&'static str>,
    pub calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeCluster {
    pub state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn fail(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), ClusterError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push(call);
        if st.failing.contains(operation) {
            return Err(ClusterError::Other(format!("{operation} rejected")));
        }
        Ok(())
    }

    fn grow(&self, group: &str, replicas: i32) {
        let mut st = self.state.lock().unwrap();
        if !st.stuck.contains(group) {
            st.ready.insert(group.to_string(), replicas);
        }
    }
}

#[async_trait]
impl ControlSurface for FakeCluster {
    async fn apply_group_policy(&self, group: &str, max_replicas: i32) -> Result<(), ClusterError> {
        self.record("apply_group_policy", Call::ApplyGroupPolicy(group.into(), max_replicas))?;
        self.grow(group, max_replicas);
        Ok(())
    }

    async fn remove_group_policy(&self, group: &str) -> Result<(), ClusterError> {
        self.record("remove_group_policy", Call::RemoveGroupPolicy(group.into()))
    }

    async fn apply_cluster_policy(&self, max_nodes_total: i32) -> Result<(), ClusterError> {
        self.record("apply_cluster_policy", Call::ApplyClusterPolicy(max_nodes_total))
    }

    async fn remove_cluster_policy(&self) -> Result<(), ClusterError> {
        self.record("remove_cluster_policy", Call::RemoveClusterPolicy)
    }

    async fn create_load_workload(&self) -> Result<String, ClusterError> {
        self.record("create_load_workload", Call::CreateWorkload)?;
        Ok(WORKLOAD_NAME.to_string())
    }

    async fn delete_load_workload(&self, name: &str) -> Result<(), ClusterError> {
        self.record("delete_load_workload", Call::DeleteWorkload(name.into()))
    }

    async fn resize_group(&self, group: &str, replicas: i32) -> Result<(), ClusterError> {
        self.record("resize_group", Call::Resize(group.into(), replicas))?;
        self.grow(group, replicas);
        Ok(())
    }
}

#[async_trait]
impl GroupStatus for FakeCluster {
    async fn ready_replicas(&self, group: &str) -> Result<i32, ClusterError> {
        let st = self.state.lock().unwrap();
        if st.broken.contains(group) {
            return Err(ClusterError::Other(format!("no such machineset {group}")));
        }
        Ok(st.ready.get(group).copied().unwrap_or(0))
    }
}

#[async_trait]
impl NodeReadiness for FakeCluster {
    async fn node_counts(&self) -> Result<NodeCounts, ClusterError> {
        let st = self.state.lock().unwrap();
        if st.failing.contains("node_counts") {
            return Err(ClusterError::Other("node listing rejected".into()));
        }
        Ok(st.node_counts)
    }
}

#[async_trait]
impl Inventory for FakeCluster {
    async fn list_groups(&self) -> Result<Vec<GroupSize>, ClusterError> {
        Ok(self.state.lock().unwrap().groups.clone())
    }

    async fn list_machines(
        &self,
        created_since: Option<DateTime<Utc>>,
    ) -> Result<MachineInventory, ClusterError> {
        let mut st = self.state.lock().unwrap();
        st.machine_listings += 1;
        let mut inv = if st.machine_listings == 1 && created_since.is_none() {
            st.before.clone()
        } else {
            st.after.clone()
        };
        if let Some(since) = created_since {
            inv.machines.retain(|_, m| m.creation_timestamp >= since);
        }
        Ok(inv)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, ClusterError> {
        let st = self.state.lock().unwrap();
        if st.failing.contains("list_nodes") {
            return Err(ClusterError::Other("node listing rejected".into()));
        }
        Ok(st.nodes.clone())
    }
}

/// Sink that keeps every batch it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<MetricBatch>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn measurements(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.measurement.clone())
            .collect()
    }

    pub fn batch(&self, measurement: &str) -> Option<MetricBatch> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.measurement == measurement)
            .cloned()
    }
}

#[async_trait]
impl MetricsSink for RecordingSink {
    async fn index(&self, batch: &MetricBatch) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail, "index rejected");
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn machine(id: &str, node_uid: Option<&str>, created: i64, ready: Option<i64>) -> MachineRecord {
    MachineRecord {
        id: id.to_string(),
        node_uid: node_uid.map(str::to_string),
        creation_timestamp: ts(created),
        ready_timestamp: ready.map(ts),
    }
}

pub fn node(uid: &str, name: &str, observed: i64, ready: Option<i64>) -> NodeRecord {
    let mut labels = BTreeMap::new();
    labels.insert("node-role.kubernetes.io/worker".to_string(), String::new());
    labels.insert("topology.kubernetes.io/zone".to_string(), "us-east-1a".to_string());
    NodeRecord {
        uid: uid.to_string(),
        name: name.to_string(),
        labels,
        observed_timestamp: ts(observed),
        ready_timestamp: ready.map(ts),
    }
}

pub fn snapshot(machines: Vec<MachineRecord>) -> MachineSnapshot {
    machines.into_iter().map(|m| (m.id.clone(), m)).collect()
}

pub fn fast_wait() -> WaitOptions {
    WaitOptions {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(300),
    }
}

pub fn fast_settings(scenario: Scenario) -> ScenarioSettings {
    ScenarioSettings {
        scenario,
        job_name: "workers-scale".into(),
        autoscaler_buffer: 10,
        settle_delay: Duration::ZERO,
        wait: fast_wait(),
        collector_interval: Duration::from_millis(5),
    }
}

/// Two groups (workers-a: 2, workers-b: 3) with five machines, and an after
/// listing holding one new ready machine per group.
pub fn two_group_cluster() -> FakeCluster {
    let before = vec![
        machine("workers-a-0", Some("ua0"), 100, Some(150)),
        machine("workers-a-1", Some("ua1"), 100, Some(150)),
        machine("workers-b-0", Some("ub0"), 100, Some(150)),
        machine("workers-b-1", Some("ub1"), 100, Some(150)),
        machine("workers-b-2", Some("ub2"), 100, Some(150)),
    ];
    let mut after = before.clone();
    after.push(machine("workers-a-new", Some("ua-new"), 2_000, Some(2_100)));
    after.push(machine("workers-b-new", Some("ub-new"), 2_010, Some(2_120)));

    FakeCluster::new(FakeState {
        groups: vec![
            GroupSize {
                name: "workers-a".into(),
                replicas: 2,
            },
            GroupSize {
                name: "workers-b".into(),
                replicas: 3,
            },
        ],
        before: MachineInventory {
            machines: snapshot(before),
            boot_image_id: "ami-0123".into(),
        },
        after: MachineInventory {
            machines: snapshot(after),
            boot_image_id: "ami-0123".into(),
        },
        nodes: vec![
            node("ua-new", "ip-10-0-1-1", 2_050, Some(2_200)),
            node("ub-new", "ip-10-0-1-2", 2_060, Some(2_210)),
        ],
        node_counts: NodeCounts { ready: 7, total: 7 },
        ..FakeState::default()
    })
}
