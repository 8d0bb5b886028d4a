//! Redistribution of capital across active allocations. Preview is a pure
//! computation against a versioned snapshot; execute replays the same
//! proposal through the store's CAS so a concurrent writer forces a
//! re-preview instead of a silent overwrite.

use crate::error::LedgerError;
use crate::ledger::LedgerStore;
use crate::types::{Allocation, AllocationDiff, AllocationStatus, RebalanceOutcome};

/// The numeric redistribution rule. Pluggable: the reward/shrink magnitudes
/// are policy, not ledger semantics.
pub trait RebalancePolicy: Send + Sync {
    /// Propose new amounts for the Active rows. Implementations do not need
    /// to respect the pool cap; the engine scales the proposal afterwards.
    fn propose(&self, active: &[&Allocation]) -> Vec<AllocationDiff>;
}

/// Default policy: reward winners, shrink losers, by a fixed step of the
/// current amount, clamped to a per-allocation floor and ceiling.
pub struct PnlWeightedPolicy {
    pub step_pct: f64,
    pub floor: f64,
    pub ceiling: f64,
}

impl RebalancePolicy for PnlWeightedPolicy {
    fn propose(&self, active: &[&Allocation]) -> Vec<AllocationDiff> {
        let mut diffs = Vec::new();
        for row in active {
            let amount = row.allocation_amount;
            let proposed = if row.realized_pnl > 0.0 {
                amount * (1.0 + self.step_pct)
            } else if row.realized_pnl < 0.0 {
                amount * (1.0 - self.step_pct)
            } else {
                amount
            };
            let clamped = proposed.clamp(self.floor, self.ceiling);
            if (clamped - amount).abs() > f64::EPSILON {
                diffs.push(AllocationDiff {
                    id: row.id.clone(),
                    old_amount: amount,
                    new_amount: clamped,
                });
            }
        }
        diffs
    }
}

pub struct RebalanceEngine {
    policy: Box<dyn RebalancePolicy>,
}

impl RebalanceEngine {
    pub fn new(policy: Box<dyn RebalancePolicy>) -> Self {
        Self { policy }
    }

    /// Compute a proposal against the current ledger. Never mutates; the
    /// returned version is the CAS token for a later execute.
    pub fn preview(&self, store: &LedgerStore) -> RebalanceOutcome {
        let view = store.get_ledger();
        let pool = store.get_pool_status();
        let diffs = self.propose_scaled(&view.rows, pool.cap_pct, pool.equity);
        RebalanceOutcome { ledger_version: view.ledger_version, diffs }
    }

    /// Recompute against the expected version and apply through the store's
    /// CAS. A `VersionConflict` means the world changed since preview; the
    /// caller must re-preview. Nothing is applied on any error.
    pub fn execute(
        &self,
        store: &LedgerStore,
        expected_version: u64,
    ) -> Result<RebalanceOutcome, LedgerError> {
        let view = store.get_ledger();
        if view.ledger_version != expected_version {
            return Err(LedgerError::VersionConflict { current_version: view.ledger_version });
        }
        let pool = store.get_pool_status();
        let diffs = self.propose_scaled(&view.rows, pool.cap_pct, pool.equity);
        if diffs.is_empty() {
            return Ok(RebalanceOutcome { ledger_version: expected_version, diffs });
        }
        let new_version = store.apply_rebalance(expected_version, &diffs)?;
        Ok(RebalanceOutcome { ledger_version: new_version, diffs })
    }

    /// Policy proposal plus proportional scale-down so the post-rebalance
    /// committed sum never exceeds the pool cap.
    fn propose_scaled(&self, rows: &[Allocation], cap_pct: f64, equity: f64) -> Vec<AllocationDiff> {
        let active: Vec<&Allocation> = rows
            .iter()
            .filter(|r| r.status == AllocationStatus::Active)
            .collect();
        let mut diffs = self.policy.propose(&active);
        if diffs.is_empty() {
            return diffs;
        }

        // Capacity already held by rows the policy does not touch
        // (Activating and Halting still hold their slice).
        let reserved: f64 = rows
            .iter()
            .filter(|r| r.status.holds_capacity() && r.status != AllocationStatus::Active)
            .map(|r| r.allocation_amount)
            .sum();
        let untouched_active: f64 = active
            .iter()
            .filter(|r| diffs.iter().all(|d| d.id != r.id))
            .map(|r| r.allocation_amount)
            .sum();
        let proposed: f64 = diffs.iter().map(|d| d.new_amount).sum();
        let cap = cap_pct * equity;
        let headroom = cap - reserved - untouched_active;

        if proposed > headroom && proposed > 0.0 {
            let factor = (headroom / proposed).max(0.0);
            for diff in diffs.iter_mut() {
                diff.new_amount *= factor;
            }
            diffs.retain(|d| (d.new_amount - d.old_amount).abs() > f64::EPSILON);
        }
        diffs
    }
}

impl Default for RebalanceEngine {
    fn default() -> Self {
        Self::new(Box::new(PnlWeightedPolicy {
            step_pct: 0.10,
            floor: 100.0,
            ceiling: 25_000.0,
        }))
    }
}

/// Pure capacity check used by tests and callers that want to validate a
/// hand-built diff set before submitting it.
pub fn respects_cap(rows: &[Allocation], diffs: &[AllocationDiff], cap_pct: f64, equity: f64) -> bool {
    let committed: f64 = rows
        .iter()
        .filter(|r| r.status.holds_capacity())
        .map(|r| {
            diffs
                .iter()
                .find(|d| d.id == r.id)
                .map(|d| d.new_amount)
                .unwrap_or(r.allocation_amount)
        })
        .sum();
    committed <= cap_pct * equity + 1e-9
}
