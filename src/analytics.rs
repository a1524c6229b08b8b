// Latency analytics: match newly scaled machines with their nodes, compute
// per-stage bring-up latencies and summarize them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{
    Exclusions, LatencyReport, LatencySample, MachineRecord, MachineSnapshot, NodeRecords,
    Quantile, ScalePlan, Stage, StackedSummary, StageQuantiles,
};

/// Machines in `after` whose id is not in `before`, in id order.
pub fn discard_previous<'a>(
    before: &MachineSnapshot,
    after: &'a MachineSnapshot,
) -> Vec<&'a MachineRecord> {
    after
        .iter()
        .filter(|(id, _)| !before.contains_key(*id))
        .map(|(_, m)| m)
        .collect()
}

/// Rewrites '.' in label keys to '_'. On collision the key later in sorted
/// order wins.
pub fn sanitize_labels(labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.replace('.', "_"), v.clone()))
        .collect()
}

/// `event - trigger` truncated to whole milliseconds.
pub fn latency_ms(event: DateTime<Utc>, trigger: DateTime<Utc>) -> i64 {
    (event - trigger).num_milliseconds()
}

/// Builds the latency report for machines that appeared between the two snapshots.
///
/// The trigger is `explicit_trigger` when given, otherwise the owning group's
/// stamped trigger from `plan`. Machines without a node record, without a
/// trigger, or not yet ready are counted in `excluded` instead of sampled.
pub fn analyze(
    plan: &ScalePlan,
    before: &MachineSnapshot,
    after: &MachineSnapshot,
    nodes: &NodeRecords,
    boot_image_id: &str,
    explicit_trigger: Option<DateTime<Utc>>,
) -> LatencyReport {
    let scaled = discard_previous(before, after);
    let mut samples = Vec::with_capacity(scaled.len());
    let mut excluded = Exclusions::default();

    for machine in scaled {
        let Some(node) = machine.node_uid.as_ref().and_then(|uid| nodes.get(uid)) else {
            excluded.no_node += 1;
            continue;
        };
        let group = machine.owner_group();
        let trigger = explicit_trigger
            .or_else(|| plan.get(group).and_then(|edit| edit.trigger_timestamp));
        let Some(trigger) = trigger else {
            tracing::debug!(machine = %machine.id, group, "no trigger for machine's group");
            excluded.untriggered += 1;
            continue;
        };
        let (Some(machine_ready), Some(node_ready)) = (machine.ready_timestamp, node.ready_timestamp)
        else {
            excluded.not_ready += 1;
            continue;
        };

        samples.push(LatencySample {
            machine_id: machine.id.clone(),
            group: group.to_string(),
            node_name: node.name.clone(),
            labels: sanitize_labels(&node.labels),
            boot_image_id: boot_image_id.to_string(),
            scale_event_timestamp: trigger,
            machine_creation_timestamp: machine.creation_timestamp,
            machine_creation_latency: latency_ms(machine.creation_timestamp, trigger),
            machine_ready_timestamp: machine_ready,
            machine_ready_latency: latency_ms(machine_ready, trigger),
            node_creation_timestamp: node.observed_timestamp,
            node_creation_latency: latency_ms(node.observed_timestamp, trigger),
            node_ready_timestamp: node_ready,
            node_ready_latency: latency_ms(node_ready, trigger),
        });
    }

    if excluded.total() > 0 {
        tracing::info!(
            sampled = samples.len(),
            no_node = excluded.no_node,
            not_ready = excluded.not_ready,
            untriggered = excluded.untriggered,
            "machines excluded from latency samples"
        );
    }

    let quantiles = summarize(&samples);
    let stacked = stack(&quantiles, boot_image_id);
    LatencyReport {
        samples,
        excluded,
        quantiles,
        stacked,
    }
}

/// One StageQuantiles per stage, in stage order. Empty input yields no entries.
pub fn summarize(samples: &[LatencySample]) -> Vec<StageQuantiles> {
    Stage::ALL
        .iter()
        .filter_map(|stage| {
            let values: Vec<i64> = samples.iter().map(|s| stage.latency_of(s)).collect();
            stage_quantiles(*stage, &values)
        })
        .collect()
}

/// Quantiles over `values`; `None` when there are none. Percentiles use the
/// nearest-rank method and avg is rounded to the nearest millisecond.
pub fn stage_quantiles(stage: Stage, values: &[i64]) -> Option<StageQuantiles> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let sum: i128 = sorted.iter().map(|v| *v as i128).sum();
    let avg = (sum as f64 / sorted.len() as f64).round() as i64;

    Some(StageQuantiles {
        quantile_name: stage,
        p50: nearest_rank(&sorted, 50),
        p95: nearest_rank(&sorted, 95),
        p99: nearest_rank(&sorted, 99),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        avg,
    })
}

fn nearest_rank(sorted: &[i64], percent: usize) -> i64 {
    let n = sorted.len();
    let rank = (percent * n).div_ceil(100).clamp(1, n);
    sorted[rank - 1]
}

/// Folds the stage summaries into one record keyed `<Stage>_<Quantile>`.
pub fn stack(quantiles: &[StageQuantiles], boot_image_id: &str) -> StackedSummary {
    let mut values = BTreeMap::new();
    for q in quantiles {
        for quantile in Quantile::ALL {
            values.insert(StackedSummary::key(q.quantile_name, quantile), quantile.of(q));
        }
    }
    StackedSummary {
        boot_image_id: boot_image_id.to_string(),
        values,
    }
}
