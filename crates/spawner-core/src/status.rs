//! Lifecycle status of a remote unit, as reported by a backend.

use serde::{Deserialize, Serialize};

/// Status of a unit on the cluster backend.
///
/// Backends map their own state names onto these; only `Running` carries
/// meaning for the orchestrators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    /// Accepted but not yet started (provisioning, pulling images, ...).
    #[default]
    Pending,
    /// Running and, once its address is resolved, reachable.
    Running,
    /// On its way down.
    Stopping,
    /// Stopped.
    Stopped,
    /// A state this adapter does not recognize.
    Unknown,
}

impl UnitStatus {
    /// Returns true if the unit is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if the unit will never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}
