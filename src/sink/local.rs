// Local sink: one pretty-printed JSON array per measurement and job.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{MetricBatch, MetricsSink};

pub struct LocalSink {
    dir: PathBuf,
}

impl LocalSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a batch is written to: `<dir>/<measurement>-<job>.json`.
    pub fn path_for(&self, measurement: &str, job_name: &str) -> PathBuf {
        self.dir.join(format!("{measurement}-{job_name}.json"))
    }
}

#[async_trait]
impl MetricsSink for LocalSink {
    async fn index(&self, batch: &MetricBatch) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&batch.measurement, &batch.tags.job_name);
        let body = serde_json::to_vec_pretty(&batch.documents)?;
        tokio::fs::write(&path, body).await?;
        tracing::info!(path = %path.display(), documents = batch.documents.len(), "metrics written");
        Ok(())
    }
}
