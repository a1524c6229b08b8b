// Convergence waiter: one polling task per group, barrier join, then a single
// cluster-wide node readiness wait. Group failures are recorded; the readiness
// failure is fatal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument};

use crate::cluster::{GroupStatus, NodeReadiness};
use crate::error::{ClusterError, ScaleError};
use crate::models::{NodeCounts, ScalePlan};

/// Default upper bound for any single wait.
pub const MAX_WAIT_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: MAX_WAIT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    Converged { elapsed: Duration },
    /// Timeout hit; `last_ready` is the last count observed, if any.
    TimedOut { last_ready: Option<i32> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub group: String,
    pub target: i32,
    pub convergence: Convergence,
}

impl GroupOutcome {
    pub fn converged(&self) -> bool {
        matches!(self.convergence, Convergence::Converged { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// One entry per plan edit, sorted by group name.
    pub groups: Vec<GroupOutcome>,
    /// Time the final cluster-wide readiness wait took.
    pub nodes_ready_after: Duration,
}

impl ConvergenceReport {
    pub fn converged(&self) -> Vec<&str> {
        self.select(|c| matches!(c, Convergence::Converged { .. }))
    }

    pub fn timed_out(&self) -> Vec<&str> {
        self.select(|c| matches!(c, Convergence::TimedOut { .. }))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.select(|c| matches!(c, Convergence::Failed { .. }))
    }

    pub fn all_converged(&self) -> bool {
        self.groups.iter().all(GroupOutcome::converged)
    }

    fn select(&self, pred: impl Fn(&Convergence) -> bool) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|g| pred(&g.convergence))
            .map(|g| g.group.as_str())
            .collect()
    }
}

/// Stamps `trigger` into the plan, waits for every group to reach its target,
/// then waits for all cluster nodes to be ready.
///
/// Each group is polled by its own task and a failing group never stops its
/// siblings. Only a failed readiness wait is returned as an error.
pub async fn await_convergence<S, R>(
    plan: &mut ScalePlan,
    status: Arc<S>,
    readiness: &R,
    trigger: DateTime<Utc>,
    opts: WaitOptions,
) -> Result<ConvergenceReport, ScaleError>
where
    S: GroupStatus + ?Sized + 'static,
    R: NodeReadiness + ?Sized,
{
    plan.stamp_trigger(trigger);

    let mut pending = Vec::with_capacity(plan.len());
    let mut handles = Vec::with_capacity(plan.len());
    for edit in plan.sorted() {
        let status = Arc::clone(&status);
        let group = edit.name.clone();
        let target = edit.target_size;
        pending.push((group.clone(), target));
        handles.push(tokio::spawn(async move {
            wait_for_group(status.as_ref(), &group, target, opts).await
        }));
    }

    let mut groups = Vec::with_capacity(handles.len());
    for ((group, target), joined) in pending.into_iter().zip(join_all(handles).await) {
        let convergence = joined.unwrap_or_else(|e| Convergence::Failed {
            error: format!("wait task aborted: {e}"),
        });
        groups.push(GroupOutcome {
            group,
            target,
            convergence,
        });
    }

    let report_groups = groups.len();
    let converged = groups.iter().filter(|g| g.converged()).count();
    info!(
        groups = report_groups,
        converged,
        not_converged = report_groups - converged,
        "all group waits finished"
    );

    let nodes_ready_after = wait_for_nodes(readiness, opts).await?;
    Ok(ConvergenceReport {
        groups,
        nodes_ready_after,
    })
}

#[instrument(skip(status, opts), fields(operation = "wait_for_group"))]
async fn wait_for_group<S>(status: &S, group: &str, target: i32, opts: WaitOptions) -> Convergence
where
    S: GroupStatus + ?Sized,
{
    let started = Instant::now();
    let mut last_ready: Option<i32> = None;

    let polled = tokio::time::timeout(opts.timeout, async {
        let mut tick = interval(opts.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let ready = status.ready_replicas(group).await?;
            last_ready = Some(ready);
            if ready >= target {
                return Ok::<(), ClusterError>(());
            }
            debug!(ready, target, "group not converged yet");
        }
    })
    .await;

    match polled {
        Ok(Ok(())) => {
            let elapsed = started.elapsed();
            info!(elapsed_ms = elapsed.as_millis() as u64, "group converged");
            Convergence::Converged { elapsed }
        }
        Ok(Err(e)) => {
            error!(error = %e, "failed waiting for group");
            Convergence::Failed {
                error: e.to_string(),
            }
        }
        Err(_) => {
            error!(?last_ready, timeout_secs = opts.timeout.as_secs(), "timed out waiting for group");
            Convergence::TimedOut { last_ready }
        }
    }
}

/// Polls cluster-wide readiness until every node is ready. Returns how long it took.
#[instrument(skip_all, fields(operation = "wait_for_nodes"))]
pub async fn wait_for_nodes<R>(readiness: &R, opts: WaitOptions) -> Result<Duration, ScaleError>
where
    R: NodeReadiness + ?Sized,
{
    let started = Instant::now();
    let mut last = NodeCounts::default();

    let polled = tokio::time::timeout(opts.timeout, async {
        let mut tick = interval(opts.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let counts = readiness.node_counts().await?;
            last = counts;
            if counts.all_ready() {
                return Ok::<(), ClusterError>(());
            }
            debug!(ready = counts.ready, total = counts.total, "nodes not ready yet");
        }
    })
    .await;

    let waited = started.elapsed();
    match polled {
        Ok(Ok(())) => {
            info!(nodes = last.total, waited_ms = waited.as_millis() as u64, "all nodes ready");
            Ok(waited)
        }
        Ok(Err(e)) => Err(ScaleError::NodesNotReady {
            waited,
            reason: e.to_string(),
        }),
        Err(_) => Err(ScaleError::NodesNotReady {
            waited,
            reason: format!("{} of {} nodes ready at timeout", last.ready, last.total),
        }),
    }
}
