use crate::types::AllocationStatus;

/// Every way a ledger mutation can be rejected. All variants leave the
/// ledger unchanged; the caller decides whether to retry (VersionConflict),
/// prompt a human (PrecheckFailed, CapacityExceeded) or treat as a bug
/// (InvalidTransition, NotFound).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("precheck failed: {failed:?}")]
    PrecheckFailed { failed: Vec<String> },

    #[error("capacity exceeded: requested {requested:.2}, available {available:.2}")]
    CapacityExceeded { requested: f64, available: f64 },

    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: AllocationStatus,
        to: AllocationStatus,
    },

    #[error("version conflict: current ledger_version is {current_version}")]
    VersionConflict { current_version: u64 },

    #[error("allocation not found: {id}")]
    NotFound { id: String },
}
