// Latency samples and their per-stage summaries.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bring-up phase a latency is measured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    MachineCreation,
    MachineReady,
    NodeCreation,
    NodeReady,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::MachineCreation,
        Stage::MachineReady,
        Stage::NodeCreation,
        Stage::NodeReady,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::MachineCreation => "MachineCreation",
            Stage::MachineReady => "MachineReady",
            Stage::NodeCreation => "NodeCreation",
            Stage::NodeReady => "NodeReady",
        }
    }

    /// The sample's latency for this stage, in milliseconds.
    pub fn latency_of(&self, sample: &LatencySample) -> i64 {
        match self {
            Stage::MachineCreation => sample.machine_creation_latency,
            Stage::MachineReady => sample.machine_ready_latency,
            Stage::NodeCreation => sample.node_creation_latency,
            Stage::NodeReady => sample.node_ready_latency,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantile {
    P50,
    P95,
    P99,
    Min,
    Max,
    Avg,
}

impl Quantile {
    pub const ALL: [Quantile; 6] = [
        Quantile::P50,
        Quantile::P95,
        Quantile::P99,
        Quantile::Min,
        Quantile::Max,
        Quantile::Avg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quantile::P50 => "P50",
            Quantile::P95 => "P95",
            Quantile::P99 => "P99",
            Quantile::Min => "Min",
            Quantile::Max => "Max",
            Quantile::Avg => "Avg",
        }
    }

    pub fn of(&self, q: &StageQuantiles) -> i64 {
        match self {
            Quantile::P50 => q.p50,
            Quantile::P95 => q.p95,
            Quantile::P99 => q.p99,
            Quantile::Min => q.min,
            Quantile::Max => q.max,
            Quantile::Avg => q.avg,
        }
    }
}

/// One newly scaled machine matched with its node. Latencies are
/// `event - trigger` in whole milliseconds and may be negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySample {
    pub machine_id: String,
    pub group: String,
    pub node_name: String,
    pub labels: BTreeMap<String, String>,
    pub boot_image_id: String,
    pub scale_event_timestamp: DateTime<Utc>,
    pub machine_creation_timestamp: DateTime<Utc>,
    pub machine_creation_latency: i64,
    pub machine_ready_timestamp: DateTime<Utc>,
    pub machine_ready_latency: i64,
    pub node_creation_timestamp: DateTime<Utc>,
    pub node_creation_latency: i64,
    pub node_ready_timestamp: DateTime<Utc>,
    pub node_ready_latency: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageQuantiles {
    pub quantile_name: Stage,
    pub p50: i64,
    pub p95: i64,
    pub p99: i64,
    pub min: i64,
    pub max: i64,
    pub avg: i64,
}

/// Every stage x quantile combination in one record, keyed `<Stage>_<Quantile>`.
/// Stages without samples have no keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackedSummary {
    pub boot_image_id: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, i64>,
}

impl StackedSummary {
    pub fn key(stage: Stage, quantile: Quantile) -> String {
        format!("{}_{}", stage.as_str(), quantile.as_str())
    }

    pub fn get(&self, stage: Stage, quantile: Quantile) -> Option<i64> {
        self.values.get(&Self::key(stage, quantile)).copied()
    }
}

/// Newly scaled machines left out of the samples, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exclusions {
    /// No node record observed for the machine.
    pub no_node: usize,
    /// Machine or node never reported ready.
    pub not_ready: usize,
    /// No trigger timestamp for the machine's group.
    pub untriggered: usize,
}

impl Exclusions {
    pub fn total(&self) -> usize {
        self.no_node + self.not_ready + self.untriggered
    }
}

#[derive(Debug, Clone, Default)]
pub struct LatencyReport {
    pub samples: Vec<LatencySample>,
    pub excluded: Exclusions,
    pub quantiles: Vec<StageQuantiles>,
    pub stacked: StackedSummary,
}
