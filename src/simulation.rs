//! Drives a whole connect / dispatch / disconnect scenario against a
//! [`LocalNode`] and reports what the cancellation layer did.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::cancel::{CancellingDispatcher, ConnectionRegistry};
use crate::config::SimulationSettings;
use crate::connection::LocalConnection;
use crate::error::{OperationError, TetherResult};
use crate::node::{LocalNode, WorkRequest, WorkResponse};
use crate::transport::{Connection, actions};

/// Outcome of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub connections: usize,
    pub dispatched: usize,
    /// Operations that ran to completion
    pub completed: usize,
    /// Operations that were interrupted by a cancellation
    pub cancelled: usize,
    /// Cancellation requests received by the node
    pub cancellations_requested: usize,
    /// Connections tracked once every operation finished, before the
    /// end-of-run close
    pub tracked_connections: usize,
    /// Operations tracked once every operation finished, before the
    /// end-of-run close
    pub tracked_tasks: usize,
    /// Connections still tracked after every connection was closed
    pub tracked_connections_after_close: usize,
}

/// Runs the scenario described by `settings` on the current tokio runtime.
pub async fn run(settings: &SimulationSettings) -> TetherResult<SimulationReport> {
    settings.validate()?;

    let node = Arc::new(LocalNode::new(
        settings.node_id.as_str(),
        tokio::runtime::Handle::current(),
    ));
    let registry = ConnectionRegistry::new(node.clone());
    let dispatcher = CancellingDispatcher::new(Arc::clone(&node), registry.clone());

    let (tx, mut rx) = mpsc::unbounded_channel::<Result<WorkResponse, OperationError>>();
    let connections: Vec<Arc<LocalConnection>> = (0..settings.connections)
        .map(|_| Arc::new(LocalConnection::new()))
        .collect();

    let request = WorkRequest {
        duration: settings.operation_duration(),
    };
    let mut dispatched = 0;
    for connection in &connections {
        let client = dispatcher.for_connection(connection.clone());
        for _ in 0..settings.operations_per_connection {
            let tx = tx.clone();
            client.execute(actions::SEARCH, request, move |result| {
                // The receiver outlives every callback.
                let _ = tx.send(result);
            });
            dispatched += 1;
        }
    }
    drop(tx);

    log::info!(
        target: "tether::simulation",
        "Dispatched {} operations over {} connections",
        dispatched,
        connections.len()
    );

    if let Some(close_after) = settings.close_after() {
        tokio::time::sleep(close_after).await;
        close_all(&connections)?;
    }

    let mut report = SimulationReport {
        connections: connections.len(),
        dispatched,
        ..Default::default()
    };
    while let Some(result) = rx.recv().await {
        match result {
            Ok(_) => report.completed += 1,
            Err(OperationError::Cancelled { .. }) => report.cancelled += 1,
            Err(e) => {
                log::warn!(target: "tether::simulation", "Operation failed: {}", e);
            }
        }
    }

    report.tracked_connections = registry.num_connections();
    report.tracked_tasks = registry.num_tasks();

    if settings.close_after().is_none() {
        close_all(&connections)?;
    }

    report.cancellations_requested = node.cancellations_requested();
    report.tracked_connections_after_close = registry.num_connections();
    Ok(report)
}

fn close_all(connections: &[Arc<LocalConnection>]) -> TetherResult<()> {
    for connection in connections {
        connection.close()?;
    }
    Ok(())
}
