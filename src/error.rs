// Error taxonomy. ClusterError comes from collaborators; ScaleError is what a run returns.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("unexpected output from `{command}`: {reason}")]
    Parse { command: String, reason: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("setup: {0}")]
    Setup(String),

    #[error("inventory: {operation}: {source}")]
    Inventory {
        operation: &'static str,
        #[source]
        source: ClusterError,
    },

    #[error("apply: {operation} {target}: {source}")]
    Apply {
        operation: &'static str,
        target: String,
        #[source]
        source: ClusterError,
    },

    #[error("restore: {failed} group(s) could not be restored: {details}")]
    Restore { failed: usize, details: String },

    #[error("nodes not ready after {waited:?}: {reason}")]
    NodesNotReady { waited: Duration, reason: String },

    #[error("metrics sink: {0}")]
    Sink(#[source] anyhow::Error),
}

impl ScaleError {
    pub(crate) fn apply(operation: &'static str, target: impl Into<String>, source: ClusterError) -> Self {
        ScaleError::Apply {
            operation,
            target: target.into(),
            source,
        }
    }

    pub(crate) fn inventory(operation: &'static str, source: ClusterError) -> Self {
        ScaleError::Inventory { operation, source }
    }
}
