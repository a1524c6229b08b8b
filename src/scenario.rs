// Run orchestration: plan, scale, wait, measure, emit, clean up, restore.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::analytics::analyze;
use crate::cluster::Cluster;
use crate::collector::NodeCollector;
use crate::distributor::distribute;
use crate::error::ScaleError;
use crate::models::{Exclusions, MachineSnapshot, ScalePlan, group_sizes_by_replicas};
use crate::sink::{MetricsSink, RunTags, emit_report};
use crate::waiter::{ConvergenceReport, WaitOptions, await_convergence, wait_for_nodes};

pub const JOB_NAME: &str = "workers-scale";
pub const AUTOSCALER_BUFFER: i32 = 10;
/// Time the autoscaler resources get to come up before convergence polling.
pub const SETTLE_DELAY: Duration = Duration::from_secs(5 * 60);

/// How growth is requested from the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Autoscaling policies plus a pending-pod workload make the autoscaler grow groups.
    #[default]
    Autoscaler,
    /// Groups are resized directly.
    Direct,
}

#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    pub scenario: Scenario,
    pub job_name: String,
    pub autoscaler_buffer: i32,
    pub settle_delay: Duration,
    pub wait: WaitOptions,
    pub collector_interval: Duration,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            scenario: Scenario::default(),
            job_name: JOB_NAME.to_string(),
            autoscaler_buffer: AUTOSCALER_BUFFER,
            settle_delay: SETTLE_DELAY,
            wait: WaitOptions::default(),
            collector_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub additional_units: i32,
    /// Measure against this unix time instead of scaling.
    pub explicit_trigger_epoch: Option<i64>,
    pub restore_after_run: bool,
    pub run_id: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub boot_image_id: String,
    pub plan: ScalePlan,
    /// None in manual (explicit epoch) mode.
    pub convergence: Option<ConvergenceReport>,
    pub samples: usize,
    pub excluded: Exclusions,
    /// Recoverable problems seen during the run.
    pub warnings: Vec<String>,
}

/// Cluster objects created by a run, removed again at the end.
#[derive(Debug, Default)]
struct Applied {
    group_policies: Vec<String>,
    cluster_policy: bool,
    workload: Option<String>,
}

pub struct ScaleRunner<C: ?Sized> {
    cluster: Arc<C>,
    settings: ScenarioSettings,
}

impl<C> ScaleRunner<C>
where
    C: Cluster + ?Sized + 'static,
{
    pub fn new(cluster: Arc<C>, settings: ScenarioSettings) -> Self {
        Self { cluster, settings }
    }

    pub fn settings(&self) -> &ScenarioSettings {
        &self.settings
    }

    /// Runs one benchmark and sends its measurements to `sink`.
    ///
    /// Apply and readiness failures abort at once; created objects are removed
    /// and, if requested, groups are restored before the error is returned.
    /// A restore failure after a successful run is returned only once the
    /// metrics have been emitted.
    pub async fn run<K>(&self, request: RunRequest, sink: &K) -> Result<RunSummary, ScaleError>
    where
        K: MetricsSink + ?Sized,
    {
        let tags = RunTags {
            uuid: request.run_id.clone(),
            job_name: self.settings.job_name.clone(),
            metadata: request.metadata.clone(),
        };
        match request.explicit_trigger_epoch {
            Some(epoch) => self.run_manual(epoch, &tags, sink).await,
            None => self.run_scaled(&request, &tags, sink).await,
        }
    }

    async fn run_manual<K>(&self, epoch: i64, tags: &RunTags, sink: &K) -> Result<RunSummary, ScaleError>
    where
        K: MetricsSink + ?Sized,
    {
        let trigger = DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or_else(|| ScaleError::Setup(format!("invalid scale event epoch {epoch}")))?;
        info!(%trigger, "scale event epoch given; measuring node latencies without scaling");

        let collector = NodeCollector::start(Arc::clone(&self.cluster), self.settings.collector_interval);
        let waited = wait_for_nodes(self.cluster.as_ref(), self.settings.wait).await;
        let collected = collector.stop().await;
        waited?;

        let mut warnings = Vec::new();
        if let Some(e) = collected.stop_error {
            warn!(error = %e, operation = "stop_collector", "node collection stop failed");
            warnings.push(format!("node collector: {e}"));
        }

        let inventory = self
            .cluster
            .list_machines(Some(trigger))
            .await
            .map_err(|e| ScaleError::inventory("list_machines", e))?;
        let plan = ScalePlan::default();
        let report = analyze(
            &plan,
            &MachineSnapshot::new(),
            &inventory.machines,
            &collected.nodes,
            &inventory.boot_image_id,
            Some(trigger),
        );
        emit_report(sink, &report, tags)
            .await
            .map_err(ScaleError::Sink)?;

        Ok(RunSummary {
            boot_image_id: inventory.boot_image_id,
            plan,
            convergence: None,
            samples: report.samples.len(),
            excluded: report.excluded,
            warnings,
        })
    }

    async fn run_scaled<K>(
        &self,
        request: &RunRequest,
        tags: &RunTags,
        sink: &K,
    ) -> Result<RunSummary, ScaleError>
    where
        K: MetricsSink + ?Sized,
    {
        let groups = self
            .cluster
            .list_groups()
            .await
            .map_err(|e| ScaleError::inventory("list_groups", e))?;
        if groups.is_empty() {
            return Err(ScaleError::Setup("no node-groups found".into()));
        }
        let baseline = self
            .cluster
            .list_machines(None)
            .await
            .map_err(|e| ScaleError::inventory("list_machines", e))?;

        let (mut plan, remaining) =
            distribute(&group_sizes_by_replicas(&groups), request.additional_units);
        if remaining > 0 {
            warn!(remaining, "could not place every requested unit");
        }
        info!(
            scenario = ?self.settings.scenario,
            groups = plan.len(),
            growth = plan.total_growth(),
            "updating node-groups evenly to reach desired count"
        );

        let mut applied = Applied::default();
        let result = self
            .scale_and_measure(&mut plan, request, &baseline.machines, &mut applied, tags, sink)
            .await;

        match result {
            Ok(summary) => {
                if request.restore_after_run {
                    info!("restoring node-groups to previous state");
                    self.restore(&plan).await?;
                }
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "run aborted");
                if let Err(cleanup_err) = self.remove_applied(&mut applied).await {
                    error!(error = %cleanup_err, "cleanup after aborted run failed");
                }
                if request.restore_after_run {
                    info!("restoring node-groups to previous state");
                    if let Err(restore_err) = self.restore(&plan).await {
                        error!(error = %restore_err, "restore after aborted run failed");
                    }
                }
                Err(e)
            }
        }
    }

    async fn scale_and_measure<K>(
        &self,
        plan: &mut ScalePlan,
        request: &RunRequest,
        baseline: &MachineSnapshot,
        applied: &mut Applied,
        tags: &RunTags,
        sink: &K,
    ) -> Result<RunSummary, ScaleError>
    where
        K: MetricsSink + ?Sized,
    {
        let collector = NodeCollector::start(Arc::clone(&self.cluster), self.settings.collector_interval);

        let trigger = match self.settings.scenario {
            Scenario::Autoscaler => {
                self.apply_autoscaling(plan, request, baseline.len(), applied)
                    .await?
            }
            Scenario::Direct => self.resize_groups(plan).await?,
        };

        let convergence = await_convergence(
            plan,
            Arc::clone(&self.cluster),
            self.cluster.as_ref(),
            trigger,
            self.settings.wait,
        )
        .await?;

        let collected = collector.stop().await;
        let mut warnings = Vec::new();
        if let Some(e) = collected.stop_error {
            warn!(error = %e, operation = "stop_collector", "node collection stop failed");
            warnings.push(format!("node collector: {e}"));
        }
        for g in convergence.groups.iter().filter(|g| !g.converged()) {
            warnings.push(format!("group {} did not converge: {:?}", g.group, g.convergence));
        }

        let after = self
            .cluster
            .list_machines(None)
            .await
            .map_err(|e| ScaleError::inventory("list_machines", e))?;
        let report = analyze(
            plan,
            baseline,
            &after.machines,
            &collected.nodes,
            &after.boot_image_id,
            None,
        );
        emit_report(sink, &report, tags)
            .await
            .map_err(ScaleError::Sink)?;

        self.remove_applied(applied).await?;

        Ok(RunSummary {
            boot_image_id: after.boot_image_id,
            plan: plan.clone(),
            convergence: Some(convergence),
            samples: report.samples.len(),
            excluded: report.excluded,
            warnings,
        })
    }

    /// Applies group and cluster autoscaling policies and starts the load
    /// workload. Returns the trigger time.
    async fn apply_autoscaling(
        &self,
        plan: &ScalePlan,
        request: &RunRequest,
        baseline_machines: usize,
        applied: &mut Applied,
    ) -> Result<DateTime<Utc>, ScaleError> {
        for edit in plan.sorted() {
            self.cluster
                .apply_group_policy(&edit.name, edit.target_size)
                .await
                .map_err(|e| ScaleError::apply("apply_group_policy", &edit.name, e))?;
            applied.group_policies.push(edit.name.clone());
        }

        let baseline = i32::try_from(baseline_machines).unwrap_or(i32::MAX);
        let max_nodes_total = self
            .settings
            .autoscaler_buffer
            .saturating_add(baseline)
            .saturating_add(request.additional_units);
        self.cluster
            .apply_cluster_policy(max_nodes_total)
            .await
            .map_err(|e| ScaleError::apply("apply_cluster_policy", "cluster", e))?;
        applied.cluster_policy = true;

        let trigger = Utc::now().trunc_subsecs(0);
        let workload = self
            .cluster
            .create_load_workload()
            .await
            .map_err(|e| ScaleError::apply("create_load_workload", "job", e))?;
        applied.workload = Some(workload);

        if !self.settings.settle_delay.is_zero() {
            info!(
                delay_secs = self.settings.settle_delay.as_secs(),
                "waiting for autoscaler resources to come up"
            );
            tokio::time::sleep(self.settings.settle_delay).await;
        }
        Ok(trigger)
    }

    /// Resizes every edited group to its target. Returns the trigger time.
    async fn resize_groups(&self, plan: &ScalePlan) -> Result<DateTime<Utc>, ScaleError> {
        let trigger = Utc::now();
        for edit in plan.sorted() {
            self.cluster
                .resize_group(&edit.name, edit.target_size)
                .await
                .map_err(|e| ScaleError::apply("resize_group", &edit.name, e))?;
        }
        Ok(trigger)
    }

    /// Removes what the run created. Every removal is attempted; the first
    /// failure is returned and the failed objects stay tracked.
    async fn remove_applied(&self, applied: &mut Applied) -> Result<(), ScaleError> {
        let mut first_err = None;

        if applied.cluster_policy {
            match self.cluster.remove_cluster_policy().await {
                Ok(()) => applied.cluster_policy = false,
                Err(e) => {
                    first_err.get_or_insert(ScaleError::apply("remove_cluster_policy", "cluster", e));
                }
            }
        }

        let mut kept = Vec::new();
        for group in std::mem::take(&mut applied.group_policies) {
            if let Err(e) = self.cluster.remove_group_policy(&group).await {
                first_err.get_or_insert(ScaleError::apply("remove_group_policy", &group, e));
                kept.push(group);
            }
        }
        applied.group_policies = kept;

        if let Some(job) = applied.workload.take()
            && let Err(e) = self.cluster.delete_load_workload(&job).await
        {
            first_err.get_or_insert(ScaleError::apply("delete_load_workload", &job, e));
            applied.workload = Some(job);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resizes every edited group back to its previous size.
    async fn restore(&self, plan: &ScalePlan) -> Result<(), ScaleError> {
        let mut failures = Vec::new();
        for edit in plan.sorted() {
            if let Err(e) = self.cluster.resize_group(&edit.name, edit.previous_size).await {
                error!(group = %edit.name, error = %e, "restore failed");
                failures.push(format!("{}: {e}", edit.name));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ScaleError::Restore {
                failed: failures.len(),
                details: failures.join("; "),
            })
        }
    }
}
