// Metrics sink: receives the three measurement batches of a run.

mod local;
mod sqlite;

pub use local::LocalSink;
pub use sqlite::SqliteSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::models::LatencyReport;

pub const SAMPLES_MEASUREMENT: &str = "nodeReadyLatencyMeasurement";
pub const QUANTILES_MEASUREMENT: &str = "nodeReadyLatencyQuantilesMeasurement";
pub const STACKED_MEASUREMENT: &str = "nodeReadyLatencyStackedMeasurement";

/// Identifiers attached to every document of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTags {
    pub uuid: String,
    pub job_name: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct MetricBatch {
    pub measurement: String,
    pub tags: RunTags,
    pub documents: Vec<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tagged<'a, T: Serialize> {
    timestamp: DateTime<Utc>,
    metric_name: &'a str,
    uuid: &'a str,
    job_name: &'a str,
    metadata: &'a Map<String, Value>,
    #[serde(flatten)]
    record: &'a T,
}

impl MetricBatch {
    /// Serializes `records` into documents carrying the run tags.
    pub fn from_records<T: Serialize>(
        measurement: &str,
        tags: &RunTags,
        records: &[T],
        timestamp: DateTime<Utc>,
    ) -> serde_json::Result<Self> {
        let documents = records
            .iter()
            .map(|record| {
                serde_json::to_value(Tagged {
                    timestamp,
                    metric_name: measurement,
                    uuid: &tags.uuid,
                    job_name: &tags.job_name,
                    metadata: &tags.metadata,
                    record,
                })
            })
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(Self {
            measurement: measurement.to_string(),
            tags: tags.clone(),
            documents,
        })
    }
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn index(&self, batch: &MetricBatch) -> anyhow::Result<()>;
}

/// Sends samples, stage quantiles and the stacked summary to `sink`.
pub async fn emit_report<K>(sink: &K, report: &LatencyReport, tags: &RunTags) -> anyhow::Result<()>
where
    K: MetricsSink + ?Sized,
{
    for q in &report.quantiles {
        info!(
            job = %tags.job_name,
            stage = %q.quantile_name,
            p50 = q.p50,
            p99 = q.p99,
            max = q.max,
            avg = q.avg,
            "latency quantiles"
        );
    }

    let now = Utc::now();
    let batches = [
        MetricBatch::from_records(SAMPLES_MEASUREMENT, tags, &report.samples, now)?,
        MetricBatch::from_records(QUANTILES_MEASUREMENT, tags, &report.quantiles, now)?,
        MetricBatch::from_records(STACKED_MEASUREMENT, tags, std::slice::from_ref(&report.stacked), now)?,
    ];
    for batch in &batches {
        sink.index(batch).await?;
        tracing::debug!(
            measurement = %batch.measurement,
            documents = batch.documents.len(),
            "batch indexed"
        );
    }
    Ok(())
}
