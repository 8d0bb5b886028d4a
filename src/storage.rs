use anyhow::Result;
use rusqlite::{params, Connection};

use crate::types::{LedgerView, PoolStatus};

/// Queryable history of ledger and pool snapshots, written on the persist
/// interval. Recovery goes through the WAL; this store exists for reporting.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS allocations (
                ts INTEGER NOT NULL,
                ledger_version INTEGER NOT NULL,
                allocation_id TEXT NOT NULL,
                status TEXT NOT NULL,
                strategy_ref TEXT NOT NULL,
                session_id TEXT NOT NULL,
                amount REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                ttl_until INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pool_metrics (
                ts INTEGER NOT NULL,
                ledger_version INTEGER NOT NULL,
                equity REAL NOT NULL,
                utilization_pct REAL NOT NULL,
                available_capacity REAL NOT NULL,
                pool_pnl REAL NOT NULL,
                active_count INTEGER NOT NULL,
                risk_level TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn persist_snapshot(&mut self, ts: u64, view: &LedgerView, pool: &PoolStatus) -> Result<()> {
        let tx = self.conn.transaction()?;
        for row in &view.rows {
            tx.execute(
                "INSERT INTO allocations (ts, ledger_version, allocation_id, status, strategy_ref,
                                          session_id, amount, realized_pnl, ttl_until)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    ts as i64,
                    view.ledger_version as i64,
                    row.id,
                    row.status.as_str(),
                    row.strategy_ref,
                    row.session_id,
                    row.allocation_amount,
                    row.realized_pnl,
                    row.ttl_until as i64
                ],
            )?;
        }
        tx.execute(
            "INSERT INTO pool_metrics (ts, ledger_version, equity, utilization_pct,
                                       available_capacity, pool_pnl, active_count, risk_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                ts as i64,
                view.ledger_version as i64,
                pool.equity,
                pool.utilization_pct,
                pool.available_capacity,
                pool.pool_pnl,
                pool.active_count as i64,
                pool.risk_level.as_str()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Allocation, AllocationStatus, RiskLevel};

    fn sample_view() -> LedgerView {
        LedgerView {
            ledger_version: 7,
            rows: vec![Allocation {
                id: "AL-1".to_string(),
                status: AllocationStatus::Active,
                strategy_ref: "strat-1".to_string(),
                session_id: "sess-1".to_string(),
                allocation_amount: 1000.0,
                ttl_until: 5000,
                realized_pnl: 42.0,
                symbol_hint: vec![],
                created_at: 1000,
            }],
        }
    }

    fn sample_pool() -> PoolStatus {
        PoolStatus {
            cap_pct: 0.5,
            utilization_pct: 0.01,
            equity: 100_000.0,
            pool_pnl: 42.0,
            active_count: 1,
            available_capacity: 49_000.0,
            risk_level: RiskLevel::Low,
        }
    }

    #[test]
    fn test_persist_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let mut store = StateStore::new(path.to_str().unwrap()).unwrap();
        store.init().unwrap();
        store.persist_snapshot(2000, &sample_view(), &sample_pool()).unwrap();

        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM allocations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let (version, status): (i64, String) = store
            .conn
            .query_row(
                "SELECT ledger_version, status FROM allocations WHERE allocation_id = 'AL-1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(version, 7);
        assert_eq!(status, "active");

        let risk: String = store
            .conn
            .query_row("SELECT risk_level FROM pool_metrics", [], |r| r.get(0))
            .unwrap();
        assert_eq!(risk, "low");
    }

    #[test]
    fn test_init_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let mut store = StateStore::new(path.to_str().unwrap()).unwrap();
        store.init().unwrap();
        store.init().unwrap();
    }
}
