// Node latency measurement window: a background task polls the node inventory
// from start() until stop() and keeps the latest record per node uid.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::Instrument;

use crate::cluster::Inventory;
use crate::error::ClusterError;
use crate::models::{NodeRecord, NodeRecords};

/// Nodes gathered during the window. `stop_error` is set when the final
/// listing or the task itself failed; `nodes` still holds what was gathered.
#[derive(Debug, Default)]
pub struct CollectedNodes {
    pub nodes: NodeRecords,
    pub stop_error: Option<String>,
}

struct CollectorOutput {
    nodes: NodeRecords,
    final_error: Option<ClusterError>,
}

pub struct NodeCollector {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<CollectorOutput>,
}

impl NodeCollector {
    /// Spawns the polling task. The first listing happens immediately.
    pub fn start<I>(inventory: Arc<I>, poll_interval: Duration) -> Self
    where
        I: Inventory + ?Sized + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let span = tracing::debug_span!("node_collector", poll_interval_ms = poll_interval.as_millis() as u64);

        let handle = tokio::spawn(
            async move {
                let mut nodes = NodeRecords::new();
                let mut tick = interval(poll_interval);
                tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            match inventory.list_nodes().await {
                                Ok(list) => merge(&mut nodes, list),
                                Err(e) => tracing::warn!(
                                    error = %e,
                                    operation = "list_nodes",
                                    "node listing failed"
                                ),
                            }
                        }
                        _ = &mut shutdown_rx => break,
                    }
                }

                let final_error = match inventory.list_nodes().await {
                    Ok(list) => {
                        merge(&mut nodes, list);
                        None
                    }
                    Err(e) => Some(e),
                };
                tracing::debug!(nodes = nodes.len(), "node collector stopped");
                CollectorOutput { nodes, final_error }
            }
            .instrument(span),
        );

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Ends the window and returns the collected nodes.
    pub async fn stop(self) -> CollectedNodes {
        let _ = self.shutdown_tx.send(());
        match self.handle.await {
            Ok(out) => CollectedNodes {
                nodes: out.nodes,
                stop_error: out.final_error.map(|e| e.to_string()),
            },
            Err(e) => CollectedNodes {
                nodes: NodeRecords::new(),
                stop_error: Some(format!("node collector task failed: {e}")),
            },
        }
    }
}

/// Newer observations replace older ones, except that a known ready time is
/// not dropped by an observation without one.
fn merge(nodes: &mut NodeRecords, list: Vec<NodeRecord>) {
    for mut node in list {
        if node.ready_timestamp.is_none()
            && let Some(known) = nodes.get(&node.uid)
        {
            node.ready_timestamp = known.ready_timestamp;
        }
        nodes.insert(node.uid.clone(), node);
    }
}
