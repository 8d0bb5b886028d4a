//! The ledger store: single source of truth for allocations, mutated only
//! through CAS-style operations serialized behind one mutex. The version
//! token strictly increases on every committed mutation; no mutation is
//! partially applied.

use std::sync::Mutex;

use serde_json::{json, Value};

use crate::capacity;
use crate::config::Config;
use crate::error::LedgerError;
use crate::events::{EventKind, EventPublisher, LedgerEvent};
use crate::lifecycle::{self, Action};
use crate::logging::{json_log, json_log_at, obj, v_num, v_str, Level};
use crate::precheck::PrecheckGate;
use crate::types::{
    Allocation, AllocationDiff, AllocationStatus, LedgerView, PoolStatus, PrecheckResult,
};
use crate::wal::{RecoveredState, Wal, WalEntry};

pub struct StageRequest {
    pub session_id: String,
    pub strategy_ref: String,
    pub amount: f64,
    pub ttl_secs: Option<u64>,
    pub symbol_hint: Vec<String>,
}

struct LedgerInner {
    version: u64,
    equity: f64,
    next_seq: u64,
    rows: Vec<Allocation>,
    wal: Option<Wal>,
}

impl LedgerInner {
    fn append_wal(&mut self, entry: &WalEntry) {
        if let Some(wal) = self.wal.as_mut() {
            if let Err(err) = wal.append_entry(entry) {
                json_log_at(
                    Level::Error,
                    "wal_error",
                    obj(&[("error", v_str(&err.to_string()))]),
                );
            }
        }
    }

    fn find(&self, id: &str) -> Result<usize, LedgerError> {
        self.rows
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| LedgerError::NotFound { id: id.to_string() })
    }
}

pub struct LedgerStore {
    inner: Mutex<LedgerInner>,
    gate: PrecheckGate,
    publisher: EventPublisher,
    cfg: Config,
}

impl LedgerStore {
    pub fn new(cfg: Config, gate: PrecheckGate, publisher: EventPublisher) -> Self {
        let equity = cfg.equity;
        Self {
            inner: Mutex::new(LedgerInner {
                version: 0,
                equity,
                next_seq: 0,
                rows: Vec::new(),
                wal: None,
            }),
            gate,
            publisher,
            cfg,
        }
    }

    /// Resume from WAL recovery. The recovered version is kept so clients
    /// holding pre-restart versions fail their CAS instead of silently
    /// writing against a reset counter.
    pub fn from_recovered(
        cfg: Config,
        gate: PrecheckGate,
        publisher: EventPublisher,
        recovered: RecoveredState,
        wal: Wal,
    ) -> Self {
        let equity = recovered.equity.unwrap_or(cfg.equity);
        Self {
            inner: Mutex::new(LedgerInner {
                version: recovered.version,
                equity,
                next_seq: recovered.next_seq,
                rows: recovered.rows,
                wal: Some(wal),
            }),
            gate,
            publisher,
            cfg,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        // A poisoned lock means a panic mid-mutation; the process is not
        // recoverable at that point, so propagate the panic.
        self.inner.lock().expect("ledger mutex poisoned")
    }

    fn publish(&self, kind: EventKind, version: u64, payload: Value) {
        self.publisher.publish(LedgerEvent { kind, ledger_version: version, payload });
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn get_ledger(&self) -> LedgerView {
        let inner = self.lock();
        LedgerView { ledger_version: inner.version, rows: inner.rows.clone() }
    }

    pub fn get_pool_status(&self) -> PoolStatus {
        let inner = self.lock();
        capacity::pool_status(self.cfg.cap_pct, inner.equity, &inner.rows)
    }

    pub fn precheck(&self, session_id: &str, strategy_ref: &str) -> Option<PrecheckResult> {
        self.gate.check(session_id, strategy_ref)
    }

    // -----------------------------------------------------------------------
    // Mutations (each advances the version exactly once, or not at all)
    // -----------------------------------------------------------------------

    /// Admit a new allocation. Requires a passing precheck and enough pool
    /// headroom; on success the row enters the ledger as `Staged`.
    pub fn stage(&self, req: StageRequest, now: u64) -> Result<Allocation, LedgerError> {
        let precheck = self.gate.check(&req.session_id, &req.strategy_ref);
        match precheck {
            Some(result) if result.ok => {}
            Some(result) => {
                json_log(
                    "ledger",
                    obj(&[
                        ("op", v_str("stage")),
                        ("result", v_str("precheck_failed")),
                        ("strategy_ref", v_str(&req.strategy_ref)),
                        ("failed", json!(result.failed)),
                    ]),
                );
                return Err(LedgerError::PrecheckFailed { failed: result.failed });
            }
            None => {
                return Err(LedgerError::PrecheckFailed {
                    failed: vec!["metrics_unavailable".to_string()],
                })
            }
        }

        let mut inner = self.lock();
        let available =
            capacity::available_capacity(self.cfg.cap_pct, inner.equity, &inner.rows);
        if req.amount > available {
            json_log(
                "ledger",
                obj(&[
                    ("op", v_str("stage")),
                    ("result", v_str("capacity_exceeded")),
                    ("requested", v_num(req.amount)),
                    ("available", v_num(available)),
                ]),
            );
            return Err(LedgerError::CapacityExceeded {
                requested: req.amount,
                available,
            });
        }

        inner.next_seq += 1;
        let ttl_secs = req.ttl_secs.unwrap_or(self.cfg.default_ttl_secs);
        let row = Allocation {
            id: format!("AL-{}", inner.next_seq),
            status: AllocationStatus::Staged,
            strategy_ref: req.strategy_ref,
            session_id: req.session_id,
            allocation_amount: req.amount,
            ttl_until: now + ttl_secs,
            realized_pnl: 0.0,
            symbol_hint: req.symbol_hint,
            created_at: now,
        };
        inner.version += 1;
        let version = inner.version;
        inner.rows.push(row.clone());
        inner.append_wal(&WalEntry::Stage { version, row: row.clone() });
        drop(inner);

        json_log(
            "ledger",
            obj(&[
                ("op", v_str("stage")),
                ("result", v_str("committed")),
                ("id", v_str(&row.id)),
                ("amount", v_num(row.allocation_amount)),
                ("version", v_num(version as f64)),
            ]),
        );
        self.publish(
            EventKind::AllocationCreated,
            version,
            serde_json::to_value(&row).unwrap_or(Value::Null),
        );
        Ok(row)
    }

    /// Raw status transition, validated against the lifecycle table. With
    /// `expected_version` set this is a CAS; `None` serializes against the
    /// current version unconditionally.
    pub fn transition_at(
        &self,
        expected_version: Option<u64>,
        id: &str,
        to: AllocationStatus,
    ) -> Result<Allocation, LedgerError> {
        let mut inner = self.lock();
        if let Some(expected) = expected_version {
            if expected != inner.version {
                return Err(LedgerError::VersionConflict { current_version: inner.version });
            }
        }
        let idx = inner.find(id)?;
        let from = inner.rows[idx].status;
        lifecycle::check_transition(from, to)?;

        // Activating is the moment an amount starts counting against the
        // pool. Staged rows hold no capacity, so two of them can pass the
        // stage-time gate together; the headroom check must repeat here.
        if to == AllocationStatus::Activating {
            let amount = inner.rows[idx].allocation_amount;
            let available =
                capacity::available_capacity(self.cfg.cap_pct, inner.equity, &inner.rows);
            if amount > available {
                json_log(
                    "ledger",
                    obj(&[
                        ("op", v_str("transition")),
                        ("result", v_str("capacity_exceeded")),
                        ("id", v_str(id)),
                        ("requested", v_num(amount)),
                        ("available", v_num(available)),
                    ]),
                );
                return Err(LedgerError::CapacityExceeded { requested: amount, available });
            }
        }

        inner.rows[idx].status = to;
        inner.version += 1;
        let version = inner.version;
        let row = inner.rows[idx].clone();
        inner.append_wal(&WalEntry::Transition { version, id: id.to_string(), from, to });
        let pool_changed = from.holds_capacity() != to.holds_capacity();
        drop(inner);

        json_log(
            "ledger",
            obj(&[
                ("op", v_str("transition")),
                ("id", v_str(id)),
                ("from", v_str(from.as_str())),
                ("to", v_str(to.as_str())),
                ("version", v_num(version as f64)),
            ]),
        );
        self.publish(
            EventKind::AllocationTransitioned,
            version,
            json!({"id": id, "from": from, "to": to}),
        );
        if pool_changed {
            self.publish(EventKind::PoolStatusChanged, version, json!({"cause": "transition"}));
        }
        Ok(row)
    }

    pub fn transition(&self, id: &str, to: AllocationStatus) -> Result<Allocation, LedgerError> {
        self.transition_at(None, id, to)
    }

    /// Caller-facing action entry point.
    pub fn apply_action(&self, id: &str, action: Action, now: u64) -> Result<Option<Allocation>, LedgerError> {
        // Cancel and Halt resolve to plain transitions.
        {
            let inner = self.lock();
            let idx = inner.find(id)?;
            let status = inner.rows[idx].status;
            match lifecycle::action_target(status, action)? {
                Some(target) => {
                    drop(inner);
                    return self.transition(id, target).map(Some);
                }
                None => {}
            }
        }
        match action {
            Action::Renew => self.renew(id, now).map(Some),
            Action::Remove => self.remove(id).map(|_| None),
            // action_target already returned a target for these.
            Action::Cancel | Action::Halt => unreachable!("mapped transitions handled above"),
        }
    }

    /// Extend the lease of a Halted allocation. Status does not change; the
    /// version does.
    fn renew(&self, id: &str, now: u64) -> Result<Allocation, LedgerError> {
        let mut inner = self.lock();
        let idx = inner.find(id)?;
        let status = inner.rows[idx].status;
        if status != AllocationStatus::Halted {
            return Err(LedgerError::InvalidTransition {
                from: status,
                to: AllocationStatus::Halted,
            });
        }
        let base = inner.rows[idx].ttl_until.max(now);
        inner.rows[idx].ttl_until = base + self.cfg.renew_extend_secs;
        inner.version += 1;
        let version = inner.version;
        let row = inner.rows[idx].clone();
        inner.append_wal(&WalEntry::Renew { version, id: id.to_string(), ttl_until: row.ttl_until });
        drop(inner);

        json_log(
            "ledger",
            obj(&[
                ("op", v_str("renew")),
                ("id", v_str(id)),
                ("ttl_until", v_num(row.ttl_until as f64)),
                ("version", v_num(version as f64)),
            ]),
        );
        self.publish(
            EventKind::AllocationTransitioned,
            version,
            json!({"id": id, "action": "renew", "ttl_until": row.ttl_until}),
        );
        Ok(row)
    }

    /// Drop a terminal row from the ledger.
    fn remove(&self, id: &str) -> Result<(), LedgerError> {
        let mut inner = self.lock();
        let idx = inner.find(id)?;
        let status = inner.rows[idx].status;
        if !status.is_terminal() {
            return Err(LedgerError::InvalidTransition { from: status, to: status });
        }
        inner.rows.remove(idx);
        inner.version += 1;
        let version = inner.version;
        inner.append_wal(&WalEntry::Remove { version, id: id.to_string() });
        drop(inner);

        json_log(
            "ledger",
            obj(&[
                ("op", v_str("remove")),
                ("id", v_str(id)),
                ("version", v_num(version as f64)),
            ]),
        );
        self.publish(
            EventKind::AllocationTransitioned,
            version,
            json!({"id": id, "action": "remove"}),
        );
        Ok(())
    }

    /// Atomically apply a set of amount adjustments, but only if the caller
    /// observed the current version. The sole defense against two writers
    /// rebalancing from the same snapshot.
    pub fn apply_rebalance(
        &self,
        expected_version: u64,
        diffs: &[AllocationDiff],
    ) -> Result<u64, LedgerError> {
        let mut inner = self.lock();
        if expected_version != inner.version {
            json_log(
                "ledger",
                obj(&[
                    ("op", v_str("apply_rebalance")),
                    ("result", v_str("version_conflict")),
                    ("expected", v_num(expected_version as f64)),
                    ("current", v_num(inner.version as f64)),
                ]),
            );
            return Err(LedgerError::VersionConflict { current_version: inner.version });
        }

        // Validate everything before touching anything.
        let mut indices = Vec::with_capacity(diffs.len());
        for diff in diffs {
            indices.push(inner.find(&diff.id)?);
        }
        let mut committed = 0.0;
        for (i, row) in inner.rows.iter().enumerate() {
            if !row.status.holds_capacity() {
                continue;
            }
            let amount = diffs
                .iter()
                .zip(indices.iter())
                .find(|(_, idx)| **idx == i)
                .map(|(d, _)| d.new_amount)
                .unwrap_or(row.allocation_amount);
            committed += amount;
        }
        let cap = self.cfg.cap_pct * inner.equity;
        if committed > cap + 1e-9 {
            return Err(LedgerError::CapacityExceeded {
                requested: committed,
                available: cap,
            });
        }

        for (diff, idx) in diffs.iter().zip(indices.iter()) {
            inner.rows[*idx].allocation_amount = diff.new_amount;
        }
        inner.version += 1;
        let version = inner.version;
        inner.append_wal(&WalEntry::Rebalance { version, diffs: diffs.to_vec() });
        drop(inner);

        json_log(
            "ledger",
            obj(&[
                ("op", v_str("apply_rebalance")),
                ("result", v_str("committed")),
                ("diffs", v_num(diffs.len() as f64)),
                ("version", v_num(version as f64)),
            ]),
        );
        self.publish(
            EventKind::RebalanceApplied,
            version,
            serde_json::to_value(diffs).unwrap_or(Value::Null),
        );
        self.publish(EventKind::PoolStatusChanged, version, json!({"cause": "rebalance"}));
        Ok(version)
    }

    /// Inbound settlement feed: attribute realized pnl to an allocation.
    pub fn record_settlement(&self, id: &str, pnl_delta: f64) -> Result<Allocation, LedgerError> {
        let mut inner = self.lock();
        let idx = inner.find(id)?;
        inner.rows[idx].realized_pnl += pnl_delta;
        inner.version += 1;
        let version = inner.version;
        let row = inner.rows[idx].clone();
        inner.append_wal(&WalEntry::Settlement { version, id: id.to_string(), pnl_delta });
        drop(inner);

        self.publish(
            EventKind::PoolStatusChanged,
            version,
            json!({"cause": "settlement", "id": id, "pnl_delta": pnl_delta}),
        );
        Ok(row)
    }

    /// Pool equity moved (deposit/withdrawal).
    pub fn set_equity(&self, equity: f64) -> u64 {
        let mut inner = self.lock();
        inner.equity = equity;
        inner.version += 1;
        let version = inner.version;
        inner.append_wal(&WalEntry::Equity { version, equity });
        drop(inner);

        self.publish(EventKind::PoolStatusChanged, version, json!({"cause": "equity"}));
        version
    }

    /// Durable snapshot of the full ledger; compacts the WAL down to the
    /// single snapshot entry so the log does not grow without bound.
    pub fn write_snapshot(&self) -> std::io::Result<u64> {
        let mut inner = self.lock();
        let version = inner.version;
        let equity = inner.equity;
        let next_seq = inner.next_seq;
        let rows = inner.rows.clone();
        if let Some(wal) = inner.wal.as_mut() {
            wal.write_snapshot(version, equity, next_seq, &rows)?;
        }
        Ok(version)
    }
}
