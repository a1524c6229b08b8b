use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cluster::KubectlOptions;
use crate::scenario::{AUTOSCALER_BUFFER, JOB_NAME, Scenario, ScenarioSettings};
use crate::waiter::WaitOptions;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Free-form values copied into every emitted document.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Run id; a random v4 UUID is generated when unset.
    pub uuid: Option<String>,
    pub job_name: String,
    pub scenario: Scenario,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            uuid: None,
            job_name: JOB_NAME.to_string(),
            scenario: Scenario::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub additional_worker_nodes: i32,
    /// Unix seconds of a past scale event. Set to skip scaling and only measure.
    pub scale_event_epoch: Option<i64>,
    /// Restore groups to their previous size after the run.
    pub gc: bool,
    pub autoscaler_buffer: i32,
    pub settle_delay_secs: u64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            additional_worker_nodes: 3,
            scale_event_epoch: None,
            gc: true,
            autoscaler_buffer: AUTOSCALER_BUFFER,
            settle_delay_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            timeout_secs: 4 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub poll_interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub binary: String,
    pub kubeconfig: Option<String>,
    pub machine_namespace: String,
    pub workload_namespace: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            binary: "oc".into(),
            kubeconfig: None,
            machine_namespace: "openshift-machine-api".into(),
            workload_namespace: "default".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkBackend {
    #[default]
    Local,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub backend: SinkBackend,
    /// Directory for the local backend, database file for sqlite.
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            backend: SinkBackend::Local,
            path: "collected-metrics".into(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.run.job_name.is_empty(), "run.job_name must be non-empty");
        anyhow::ensure!(
            self.scale.additional_worker_nodes >= 0,
            "scale.additional_worker_nodes must be >= 0, got {}",
            self.scale.additional_worker_nodes
        );
        if let Some(epoch) = self.scale.scale_event_epoch {
            anyhow::ensure!(epoch > 0, "scale.scale_event_epoch must be > 0, got {}", epoch);
        }
        anyhow::ensure!(
            self.scale.autoscaler_buffer >= 0,
            "scale.autoscaler_buffer must be >= 0, got {}",
            self.scale.autoscaler_buffer
        );
        anyhow::ensure!(
            self.wait.poll_interval_secs > 0,
            "wait.poll_interval_secs must be > 0, got {}",
            self.wait.poll_interval_secs
        );
        anyhow::ensure!(
            self.wait.timeout_secs > 0,
            "wait.timeout_secs must be > 0, got {}",
            self.wait.timeout_secs
        );
        anyhow::ensure!(
            self.collector.poll_interval_secs > 0,
            "collector.poll_interval_secs must be > 0, got {}",
            self.collector.poll_interval_secs
        );
        anyhow::ensure!(!self.cluster.binary.is_empty(), "cluster.binary must be non-empty");
        anyhow::ensure!(!self.metrics.path.is_empty(), "metrics.path must be non-empty");
        Ok(())
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::from_secs(self.wait.poll_interval_secs),
            timeout: Duration::from_secs(self.wait.timeout_secs),
        }
    }

    pub fn scenario_settings(&self) -> ScenarioSettings {
        ScenarioSettings {
            scenario: self.run.scenario,
            job_name: self.run.job_name.clone(),
            autoscaler_buffer: self.scale.autoscaler_buffer,
            settle_delay: Duration::from_secs(self.scale.settle_delay_secs),
            wait: self.wait_options(),
            collector_interval: Duration::from_secs(self.collector.poll_interval_secs),
        }
    }

    pub fn kubectl_options(&self) -> KubectlOptions {
        KubectlOptions {
            binary: self.cluster.binary.clone(),
            kubeconfig: self.cluster.kubeconfig.clone(),
            machine_namespace: self.cluster.machine_namespace.clone(),
            workload_namespace: self.cluster.workload_namespace.clone(),
        }
    }
}
