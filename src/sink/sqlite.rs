// SQLite sink: one row per document, JSON text payload.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::instrument;

use super::{MetricBatch, MetricsSink};

pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS measurements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                job_name TEXT NOT NULL,
                measurement TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                document TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_measurements_run ON measurements(run_id, measurement)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Documents stored for a run and measurement, in insertion order.
    pub async fn documents(&self, run_id: &str, measurement: &str) -> anyhow::Result<Vec<Value>> {
        let rows = sqlx::query(
            "SELECT document FROM measurements WHERE run_id = $1 AND measurement = $2 ORDER BY id",
        )
        .bind(run_id)
        .bind(measurement)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> anyhow::Result<Value> {
                let text: String = row.try_get("document")?;
                Ok(serde_json::from_str(&text)?)
            })
            .collect()
    }
}

#[async_trait]
impl MetricsSink for SqliteSink {
    #[instrument(skip(self, batch), fields(sink = "sqlite", measurement = %batch.measurement, documents = batch.documents.len()))]
    async fn index(&self, batch: &MetricBatch) -> anyhow::Result<()> {
        let created_at = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        for doc in &batch.documents {
            sqlx::query(
                "INSERT INTO measurements (run_id, job_name, measurement, created_at, document) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&batch.tags.uuid)
            .bind(&batch.tags.job_name)
            .bind(&batch.measurement)
            .bind(created_at)
            .bind(doc.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
