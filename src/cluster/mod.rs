// Cluster collaborators: control surface, status queries, inventory.

mod kubectl;
pub mod parse;

pub use kubectl::{KubectlCluster, KubectlOptions};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ClusterError;
use crate::models::{GroupSize, MachineInventory, NodeCounts, NodeRecord};

/// Mutating operations the benchmark issues against the cluster.
#[async_trait]
pub trait ControlSurface: Send + Sync {
    /// Creates or updates the per-group autoscaling policy.
    async fn apply_group_policy(&self, group: &str, max_replicas: i32) -> Result<(), ClusterError>;

    async fn remove_group_policy(&self, group: &str) -> Result<(), ClusterError>;

    /// Creates or updates the cluster-wide autoscaling policy.
    async fn apply_cluster_policy(&self, max_nodes_total: i32) -> Result<(), ClusterError>;

    async fn remove_cluster_policy(&self) -> Result<(), ClusterError>;

    /// Creates the load-generating workload and returns its name.
    async fn create_load_workload(&self) -> Result<String, ClusterError>;

    async fn delete_load_workload(&self, name: &str) -> Result<(), ClusterError>;

    /// Sets a group's requested replica count.
    async fn resize_group(&self, group: &str, replicas: i32) -> Result<(), ClusterError>;
}

#[async_trait]
pub trait GroupStatus: Send + Sync {
    async fn ready_replicas(&self, group: &str) -> Result<i32, ClusterError>;
}

#[async_trait]
pub trait NodeReadiness: Send + Sync {
    async fn node_counts(&self) -> Result<NodeCounts, ClusterError>;
}

#[async_trait]
pub trait Inventory: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<GroupSize>, ClusterError>;

    /// Lists machines; with `created_since`, older machines are left out.
    async fn list_machines(
        &self,
        created_since: Option<DateTime<Utc>>,
    ) -> Result<MachineInventory, ClusterError>;

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, ClusterError>;
}

/// Everything a full run needs from the cluster.
pub trait Cluster: ControlSurface + GroupStatus + NodeReadiness + Inventory {}

impl<T: ControlSurface + GroupStatus + NodeReadiness + Inventory> Cluster for T {}
