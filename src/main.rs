use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use workers_scale::*;

use workers_scale::config::{AppConfig, SinkBackend};
use workers_scale::scenario::{RunRequest, ScaleRunner};
use workers_scale::sink::{LocalSink, MetricsSink, SqliteSink};

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Measures how long new worker nodes take to become ready.
#[derive(Parser)]
#[command(name = "workers-scale", version)]
struct Cli {
    /// Run id attached to every document.
    #[arg(long)]
    uuid: Option<String>,

    /// Worker nodes to add across the node-groups.
    #[arg(long)]
    additional_worker_nodes: Option<i32>,

    /// Unix seconds of a past scale event; measure only, no scaling.
    #[arg(long)]
    scale_event_epoch: Option<i64>,

    /// Restore node-groups to their previous size afterwards.
    #[arg(long)]
    gc: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    let mut app_config = AppConfig::load()?;
    if let Some(uuid) = cli.uuid {
        app_config.run.uuid = Some(uuid);
    }
    if let Some(n) = cli.additional_worker_nodes {
        app_config.scale.additional_worker_nodes = n;
    }
    if let Some(epoch) = cli.scale_event_epoch {
        app_config.scale.scale_event_epoch = Some(epoch);
    }
    if let Some(gc) = cli.gc {
        app_config.scale.gc = gc;
    }
    app_config.validate()?;

    let run_id = app_config
        .run
        .uuid
        .clone()
        .unwrap_or_else(version::generated_run_id);
    tracing::info!(
        name = version::NAME,
        version = version::VERSION,
        run_id = %run_id,
        scenario = ?app_config.run.scenario,
        "starting"
    );

    let sink: Box<dyn MetricsSink> = match app_config.metrics.backend {
        SinkBackend::Local => Box::new(LocalSink::new(&app_config.metrics.path)),
        SinkBackend::Sqlite => {
            let sink = SqliteSink::connect(&app_config.metrics.path).await?;
            sink.init().await?;
            Box::new(sink)
        }
    };

    let cluster = Arc::new(cluster::KubectlCluster::new(app_config.kubectl_options()));
    let runner = ScaleRunner::new(cluster, app_config.scenario_settings());
    let request = RunRequest {
        additional_units: app_config.scale.additional_worker_nodes,
        explicit_trigger_epoch: app_config.scale.scale_event_epoch,
        restore_after_run: app_config.scale.gc,
        run_id,
        metadata: app_config.metadata.clone(),
    };

    let summary = runner.run(request, sink.as_ref()).await?;
    for warning in &summary.warnings {
        tracing::warn!(warning = %warning, "run finished with warning");
    }
    tracing::info!(
        boot_image_id = %summary.boot_image_id,
        samples = summary.samples,
        excluded = summary.excluded.total(),
        "run complete"
    );

    Ok(())
}
