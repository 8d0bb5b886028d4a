//! TTL expiry sweeper. Walks the ledger on a fixed cadence and force-
//! transitions rows whose lease has elapsed, always through the same CAS
//! path as every other writer. Losing a race to a human is a skip, not an
//! error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;

use crate::config::now_ts;
use crate::error::LedgerError;
use crate::ledger::LedgerStore;
use crate::logging::{json_log, obj, v_num, v_str};
use crate::types::AllocationStatus;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub halting: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// One pass over the ledger at time `now`.
///
/// Staged and Halted rows expire directly. Active rows are sent to Halting
/// first so live capital always passes through an orderly wind-down; rows
/// already Halting wait for the execution layer to finalize them to Halted,
/// and a later sweep then expires them. An Activating row that outlives its
/// lease never went live; its only wind-down edge is Failed, which releases
/// its capacity immediately.
pub fn sweep_once(store: &LedgerStore, now: u64) -> SweepStats {
    let mut stats = SweepStats::default();
    let view = store.get_ledger();

    for row in &view.rows {
        if row.ttl_until > now || row.status.is_terminal() {
            continue;
        }
        let target = match row.status {
            AllocationStatus::Staged | AllocationStatus::Halted => AllocationStatus::Expired,
            AllocationStatus::Activating => AllocationStatus::Failed,
            AllocationStatus::Active => AllocationStatus::Halting,
            _ => continue,
        };
        // Fresh version per attempt: each sweep-induced transition is its
        // own CAS and earlier successes in this pass advance the version.
        let version = store.version();
        match store.transition_at(Some(version), &row.id, target) {
            Ok(_) => match target {
                AllocationStatus::Expired => stats.expired += 1,
                AllocationStatus::Failed => stats.failed += 1,
                _ => stats.halting += 1,
            },
            Err(
                err @ (LedgerError::VersionConflict { .. }
                | LedgerError::InvalidTransition { .. }
                | LedgerError::NotFound { .. }),
            ) => {
                // Benign race: another writer got to this row first.
                stats.skipped += 1;
                json_log(
                    "sweep",
                    obj(&[
                        ("id", v_str(&row.id)),
                        ("result", v_str("skipped")),
                        ("reason", v_str(&err.to_string())),
                    ]),
                );
            }
            Err(err) => {
                // Anything else aborts this sweep cycle, never the process.
                json_log(
                    "sweep",
                    obj(&[
                        ("id", v_str(&row.id)),
                        ("result", v_str("cycle_aborted")),
                        ("error", v_str(&err.to_string())),
                    ]),
                );
                return stats;
            }
        }
    }
    stats
}

pub struct Sweeper {
    store: Arc<LedgerStore>,
    cadence: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<LedgerStore>, cadence: Duration) -> Self {
        Self { store, cadence }
    }

    /// Periodic loop with graceful shutdown: an in-flight sweep finishes its
    /// current pass (each CAS is atomic), then the task exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = interval(self.cadence);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let stats = sweep_once(&self.store, now_ts());
                    if stats != SweepStats::default() {
                        json_log(
                            "sweep",
                            obj(&[
                                ("expired", v_num(stats.expired as f64)),
                                ("halting", v_num(stats.halting as f64)),
                                ("failed", v_num(stats.failed as f64)),
                                ("skipped", v_num(stats.skipped as f64)),
                            ]),
                        );
                    }
                }
                _ = shutdown.changed() => {
                    json_log("sweep", obj(&[("status", v_str("shutdown"))]));
                    return;
                }
            }
        }
    }
}
