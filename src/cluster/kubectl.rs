// Cluster collaborators backed by the `oc`/`kubectl` CLI.
// Creates and updates go through `apply`, removals tolerate missing objects.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, instrument};

use super::parse;
use super::{ControlSurface, GroupStatus, Inventory, NodeReadiness};
use crate::error::ClusterError;
use crate::models::{GroupSize, MachineInventory, NodeCounts, NodeRecord};

const CLUSTER_AUTOSCALER_NAME: &str = "default";
const LOAD_JOB_PREFIX: &str = "work-queue-";
const LOAD_JOB_IMAGE: &str = "quay.io/cloud-bulldozer/nginx:latest";
const LOAD_JOB_PODS: i32 = 5000;

#[derive(Debug, Clone)]
pub struct KubectlOptions {
    /// CLI binary, e.g. "oc" or "kubectl".
    pub binary: String,
    pub kubeconfig: Option<String>,
    /// Namespace holding machinesets, machines and machine autoscalers.
    pub machine_namespace: String,
    /// Namespace the load job runs in.
    pub workload_namespace: String,
}

pub struct KubectlCluster {
    opts: KubectlOptions,
}

impl KubectlCluster {
    pub fn new(opts: KubectlOptions) -> Self {
        Self { opts }
    }

    #[instrument(skip(self, stdin), fields(binary = %self.opts.binary))]
    async fn exec(&self, args: &[&str], stdin: Option<Vec<u8>>) -> Result<String, ClusterError> {
        let command = format!("{} {}", self.opts.binary, args.join(" "));
        let mut cmd = Command::new(&self.opts.binary);
        if let Some(kubeconfig) = &self.opts.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ClusterError::Spawn {
            command: command.clone(),
            source,
        })?;
        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(&input)
                .await
                .map_err(|source| ClusterError::Spawn {
                    command: command.clone(),
                    source,
                })?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ClusterError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ClusterError::Command {
                command,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn get_json(&self, args: &[&str]) -> Result<String, ClusterError> {
        let mut full = args.to_vec();
        full.extend(["-o", "json"]);
        self.exec(&full, None).await
    }

    async fn apply(&self, manifest: &Value) -> Result<(), ClusterError> {
        let body = serde_json::to_vec(manifest).map_err(|e| ClusterError::Other(e.to_string()))?;
        self.exec(&["apply", "-f", "-"], Some(body)).await?;
        Ok(())
    }

    fn ns(&self) -> &str {
        &self.opts.machine_namespace
    }
}

fn parse_failure(command: &str, e: serde_json::Error) -> ClusterError {
    ClusterError::Parse {
        command: command.to_string(),
        reason: e.to_string(),
    }
}

fn machine_autoscaler(group: &str, namespace: &str, max_replicas: i32) -> Value {
    json!({
        "apiVersion": "autoscaling.openshift.io/v1beta1",
        "kind": "MachineAutoscaler",
        "metadata": { "name": group, "namespace": namespace },
        "spec": {
            "minReplicas": 0,
            "maxReplicas": max_replicas,
            "scaleTargetRef": {
                "apiVersion": "machine.openshift.io/v1beta1",
                "kind": "MachineSet",
                "name": group,
            },
        },
    })
}

fn cluster_autoscaler(max_nodes_total: i32) -> Value {
    json!({
        "apiVersion": "autoscaling.openshift.io/v1",
        "kind": "ClusterAutoscaler",
        "metadata": { "name": CLUSTER_AUTOSCALER_NAME },
        "spec": {
            "podPriorityThreshold": -100,
            "resourceLimits": { "maxNodesTotal": max_nodes_total },
            "scaleDown": { "enabled": false },
        },
    })
}

fn load_job(namespace: &str) -> Value {
    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": { "generateName": LOAD_JOB_PREFIX, "namespace": namespace },
        "spec": {
            "completions": LOAD_JOB_PODS,
            "parallelism": LOAD_JOB_PODS,
            "backoffLimit": 4,
            "template": {
                "spec": {
                    "restartPolicy": "Never",
                    "containers": [{
                        "name": "work",
                        "image": LOAD_JOB_IMAGE,
                        "command": ["sleep", "300"],
                        "resources": {
                            "requests": { "memory": "1000Mi", "cpu": "1000m" },
                        },
                    }],
                },
            },
        },
    })
}

#[async_trait]
impl ControlSurface for KubectlCluster {
    async fn apply_group_policy(&self, group: &str, max_replicas: i32) -> Result<(), ClusterError> {
        self.apply(&machine_autoscaler(group, self.ns(), max_replicas))
            .await?;
        info!(group, max_replicas, "MachineAutoscaler applied");
        Ok(())
    }

    async fn remove_group_policy(&self, group: &str) -> Result<(), ClusterError> {
        self.exec(
            &["delete", "machineautoscaler", group, "-n", self.ns(), "--ignore-not-found"],
            None,
        )
        .await?;
        info!(group, "MachineAutoscaler deleted");
        Ok(())
    }

    async fn apply_cluster_policy(&self, max_nodes_total: i32) -> Result<(), ClusterError> {
        self.apply(&cluster_autoscaler(max_nodes_total)).await?;
        info!(max_nodes_total, "ClusterAutoscaler applied");
        Ok(())
    }

    async fn remove_cluster_policy(&self) -> Result<(), ClusterError> {
        self.exec(
            &["delete", "clusterautoscaler", CLUSTER_AUTOSCALER_NAME, "--ignore-not-found"],
            None,
        )
        .await?;
        info!("ClusterAutoscaler deleted");
        Ok(())
    }

    async fn create_load_workload(&self) -> Result<String, ClusterError> {
        let body = serde_json::to_vec(&load_job(&self.opts.workload_namespace))
            .map_err(|e| ClusterError::Other(e.to_string()))?;
        let name = self
            .exec(
                &["create", "-f", "-", "-o", "jsonpath={.metadata.name}"],
                Some(body),
            )
            .await?
            .trim()
            .to_string();
        if name.is_empty() {
            return Err(ClusterError::Other("job created without a name".into()));
        }
        info!(job = %name, "load job created");
        Ok(name)
    }

    async fn delete_load_workload(&self, name: &str) -> Result<(), ClusterError> {
        self.exec(
            &[
                "delete",
                "job",
                name,
                "-n",
                self.opts.workload_namespace.as_str(),
                "--cascade=foreground",
                "--ignore-not-found",
            ],
            None,
        )
        .await?;
        info!(job = %name, "load job deleted");
        Ok(())
    }

    async fn resize_group(&self, group: &str, replicas: i32) -> Result<(), ClusterError> {
        let replicas_arg = format!("--replicas={replicas}");
        self.exec(
            &["scale", "machineset", group, replicas_arg.as_str(), "-n", self.ns()],
            None,
        )
        .await?;
        info!(group, replicas, "machineset resized");
        Ok(())
    }
}

#[async_trait]
impl GroupStatus for KubectlCluster {
    async fn ready_replicas(&self, group: &str) -> Result<i32, ClusterError> {
        let out = self
            .get_json(&["get", "machineset", group, "-n", self.ns()])
            .await?;
        parse::parse_ready_replicas(&out).map_err(|e| parse_failure("get machineset", e))
    }
}

#[async_trait]
impl NodeReadiness for KubectlCluster {
    async fn node_counts(&self) -> Result<NodeCounts, ClusterError> {
        let out = self.get_json(&["get", "nodes"]).await?;
        parse::parse_node_counts(&out).map_err(|e| parse_failure("get nodes", e))
    }
}

#[async_trait]
impl Inventory for KubectlCluster {
    async fn list_groups(&self) -> Result<Vec<GroupSize>, ClusterError> {
        let out = self
            .get_json(&["get", "machinesets", "-n", self.ns()])
            .await?;
        parse::parse_machine_sets(&out).map_err(|e| parse_failure("get machinesets", e))
    }

    async fn list_machines(
        &self,
        created_since: Option<DateTime<Utc>>,
    ) -> Result<MachineInventory, ClusterError> {
        let out = self
            .get_json(&["get", "machines", "-n", self.ns()])
            .await?;
        parse::parse_machines(&out, created_since).map_err(|e| parse_failure("get machines", e))
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, ClusterError> {
        let out = self.get_json(&["get", "nodes"]).await?;
        parse::parse_nodes(&out).map_err(|e| parse_failure("get nodes", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_autoscaler_caps_at_target() {
        let m = machine_autoscaler("c-worker-a", "openshift-machine-api", 5);
        assert_eq!(m["spec"]["maxReplicas"], 5);
        assert_eq!(m["spec"]["minReplicas"], 0);
        assert_eq!(m["spec"]["scaleTargetRef"]["name"], "c-worker-a");
        assert_eq!(m["metadata"]["namespace"], "openshift-machine-api");
    }

    #[test]
    fn cluster_autoscaler_disables_scale_down() {
        let c = cluster_autoscaler(42);
        assert_eq!(c["metadata"]["name"], CLUSTER_AUTOSCALER_NAME);
        assert_eq!(c["spec"]["resourceLimits"]["maxNodesTotal"], 42);
        assert_eq!(c["spec"]["scaleDown"]["enabled"], false);
    }

    #[test]
    fn load_job_uses_generate_name() {
        let j = load_job("default");
        assert_eq!(j["metadata"]["generateName"], LOAD_JOB_PREFIX);
        assert_eq!(j["spec"]["parallelism"], LOAD_JOB_PODS);
        assert_eq!(j["spec"]["template"]["spec"]["restartPolicy"], "Never");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let cluster = KubectlCluster::new(KubectlOptions {
            binary: "definitely-not-a-kubectl-binary".into(),
            kubeconfig: None,
            machine_namespace: "openshift-machine-api".into(),
            workload_namespace: "default".into(),
        });
        let err = cluster.list_groups().await.unwrap_err();
        assert!(matches!(err, ClusterError::Spawn { .. }), "got {err:?}");
    }
}
