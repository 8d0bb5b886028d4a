//! Pure pool-capacity math. No side effects, no clock, no storage.

use crate::types::{Allocation, AllocationStatus, PoolStatus, RiskLevel};

/// Capital counted against pool headroom: anything activating, active or
/// winding down still holds its slice. Staged rows are not yet committed.
pub fn committed_capital(rows: &[Allocation]) -> f64 {
    rows.iter()
        .filter(|a| a.status.holds_capacity())
        .map(|a| a.allocation_amount)
        .sum()
}

/// Headroom offered to new stage requests.
pub fn available_capacity(cap_pct: f64, equity: f64, rows: &[Allocation]) -> f64 {
    (cap_pct * equity - committed_capital(rows)).max(0.0)
}

/// Utilization counts only capital that is actually deployed (Active).
pub fn utilization_pct(equity: f64, rows: &[Allocation]) -> f64 {
    if equity <= 0.0 {
        return 0.0;
    }
    let active: f64 = rows
        .iter()
        .filter(|a| a.status == AllocationStatus::Active)
        .map(|a| a.allocation_amount)
        .sum();
    active / equity
}

pub fn risk_level(utilization_pct: f64, cap_pct: f64) -> RiskLevel {
    if utilization_pct < 0.5 * cap_pct {
        RiskLevel::Low
    } else if utilization_pct < 0.85 * cap_pct {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

pub fn pool_status(cap_pct: f64, equity: f64, rows: &[Allocation]) -> PoolStatus {
    let utilization = utilization_pct(equity, rows);
    PoolStatus {
        cap_pct,
        utilization_pct: utilization,
        equity,
        pool_pnl: rows.iter().map(|a| a.realized_pnl).sum(),
        active_count: rows
            .iter()
            .filter(|a| a.status == AllocationStatus::Active)
            .count(),
        available_capacity: available_capacity(cap_pct, equity, rows),
        risk_level: risk_level(utilization, cap_pct),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AllocationStatus::*;

    fn alloc(id: &str, status: crate::types::AllocationStatus, amount: f64, pnl: f64) -> Allocation {
        Allocation {
            id: id.to_string(),
            status,
            strategy_ref: "strat-1".to_string(),
            session_id: "sess-1".to_string(),
            allocation_amount: amount,
            ttl_until: 10_000,
            realized_pnl: pnl,
            symbol_hint: vec![],
            created_at: 0,
        }
    }

    #[test]
    fn test_committed_excludes_staged_and_terminal() {
        let rows = vec![
            alloc("a", Staged, 1000.0, 0.0),
            alloc("b", Activating, 2000.0, 0.0),
            alloc("c", Active, 3000.0, 0.0),
            alloc("d", Halting, 500.0, 0.0),
            alloc("e", Halted, 700.0, 0.0),
            alloc("f", Expired, 900.0, 0.0),
            alloc("g", Failed, 400.0, 0.0),
        ];
        // Only Activating + Active + Halting hold capacity.
        assert_eq!(committed_capital(&rows), 5500.0);
    }

    #[test]
    fn test_activating_reserves_headroom_before_active() {
        // Two stagers must not both see room: once a row is Activating its
        // amount is gone from available_capacity even though utilization
        // does not count it yet.
        let rows = vec![alloc("a", Activating, 4000.0, 0.0)];
        assert_eq!(available_capacity(0.5, 10_000.0, &rows), 1000.0);
        assert_eq!(utilization_pct(10_000.0, &rows), 0.0);
    }

    #[test]
    fn test_available_capacity_floors_at_zero() {
        let rows = vec![alloc("a", Active, 9000.0, 0.0)];
        assert_eq!(available_capacity(0.5, 10_000.0, &rows), 0.0);
    }

    #[test]
    fn test_risk_level_bands() {
        let cap = 0.5;
        assert_eq!(risk_level(0.0, cap), RiskLevel::Low);
        assert_eq!(risk_level(0.24, cap), RiskLevel::Low);
        assert_eq!(risk_level(0.25, cap), RiskLevel::Medium);
        assert_eq!(risk_level(0.42, cap), RiskLevel::Medium);
        assert_eq!(risk_level(0.425, cap), RiskLevel::High);
        assert_eq!(risk_level(0.5, cap), RiskLevel::High);
    }

    #[test]
    fn test_pool_status_aggregates() {
        let rows = vec![
            alloc("a", Active, 2000.0, 150.0),
            alloc("b", Active, 1000.0, -50.0),
            alloc("c", Staged, 500.0, 0.0),
        ];
        let status = pool_status(0.5, 10_000.0, &rows);
        assert_eq!(status.active_count, 2);
        assert_eq!(status.pool_pnl, 100.0);
        assert!((status.utilization_pct - 0.3).abs() < 1e-12);
        assert_eq!(status.available_capacity, 2000.0);
        assert_eq!(status.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_zero_equity_does_not_divide() {
        let rows = vec![alloc("a", Active, 2000.0, 0.0)];
        assert_eq!(utilization_pct(0.0, &rows), 0.0);
    }
}
