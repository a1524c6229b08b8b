// Domain models: scale plan, inventory records, latency outputs

mod inventory;
mod latency;
mod plan;

pub use inventory::{
    MachineInventory, MachineRecord, MachineSnapshot, NodeCounts, NodeRecord, NodeRecords,
    owner_group,
};
pub use latency::{
    Exclusions, LatencyReport, LatencySample, Quantile, Stage, StackedSummary, StageQuantiles,
};
pub use plan::{GroupEdit, GroupSize, ScalePlan, SizeBuckets, group_sizes_by_replicas};
