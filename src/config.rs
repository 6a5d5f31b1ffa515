//! Settings for the `simulate` command.
//!
//! Settings come from an optional TOML file and are overridden by command
//! line flags; see [`merge_settings`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TetherError, TetherResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSettings {
    /// Node ID used in generated task IDs
    pub node_id: String,
    /// Number of client connections to open
    pub connections: usize,
    /// Operations dispatched on each connection
    pub operations_per_connection: usize,
    /// How long each operation runs if not cancelled
    pub operation_duration_ms: u64,
    /// Close every connection this long after dispatching. When absent,
    /// connections are closed only after all operations have completed.
    pub close_after_ms: Option<u64>,
    pub worker_threads: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            node_id: "local".to_string(),
            connections: 4,
            operations_per_connection: 8,
            operation_duration_ms: 200,
            close_after_ms: None,
            worker_threads: 4,
        }
    }
}

impl SimulationSettings {
    /// Reads settings from a TOML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> TetherResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&contents).map_err(|e| {
            TetherError::config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> TetherResult<()> {
        if self.worker_threads == 0 {
            return Err(TetherError::config("worker_threads must be at least 1"));
        }
        if self.node_id.is_empty() {
            return Err(TetherError::config("node_id must not be empty"));
        }
        Ok(())
    }

    pub fn operation_duration(&self) -> Duration {
        Duration::from_millis(self.operation_duration_ms)
    }

    pub fn close_after(&self) -> Option<Duration> {
        self.close_after_ms.map(Duration::from_millis)
    }
}

/// Explicitly provided values; `None` means "keep the base value".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub node_id: Option<String>,
    pub connections: Option<usize>,
    pub operations_per_connection: Option<usize>,
    pub operation_duration_ms: Option<u64>,
    pub close_after_ms: Option<u64>,
    pub worker_threads: Option<usize>,
}

/// Merge overrides into base settings, preferring the overrides
pub fn merge_settings(
    base: SimulationSettings,
    overrides: SettingsOverrides,
) -> SimulationSettings {
    SimulationSettings {
        node_id: overrides.node_id.unwrap_or(base.node_id),
        connections: overrides.connections.unwrap_or(base.connections),
        operations_per_connection: overrides
            .operations_per_connection
            .unwrap_or(base.operations_per_connection),
        operation_duration_ms: overrides
            .operation_duration_ms
            .unwrap_or(base.operation_duration_ms),
        close_after_ms: overrides.close_after_ms.or(base.close_after_ms),
        worker_threads: overrides.worker_threads.unwrap_or(base.worker_threads),
    }
}
