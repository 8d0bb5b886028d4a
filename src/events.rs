//! Ledger change notifications. Delivery is at-least-once and fire-and-
//! forget; consumers are expected to be idempotent and re-derive state from
//! a full `get_ledger` read rather than trusting the event body.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AllocationCreated,
    AllocationTransitioned,
    RebalanceApplied,
    PoolStatusChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AllocationCreated => "allocation_created",
            EventKind::AllocationTransitioned => "allocation_transitioned",
            EventKind::RebalanceApplied => "rebalance_applied",
            EventKind::PoolStatusChanged => "pool_status_changed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub kind: EventKind,
    pub ledger_version: u64,
    pub payload: Value,
}

/// Broadcast fan-out to external subscribers. Publishing never blocks and
/// never fails the mutation that triggered it: a lagging or absent
/// subscriber is the subscriber's problem.
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<LedgerEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: LedgerEvent) {
        // Err means no live receivers; that is fine.
        let _ = self.tx.send(event);
    }
}
