use serde::{Deserialize, Serialize};

/// Lifecycle status of an allocation. Closed set: the transition table in
/// `lifecycle` is the only way a stored status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Staged,
    Activating,
    Active,
    Halting,
    Halted,
    Expired,
    Failed,
}

impl AllocationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AllocationStatus::Expired | AllocationStatus::Failed)
    }

    /// Counts against pool headroom offered to new stage requests.
    pub fn holds_capacity(&self) -> bool {
        matches!(
            self,
            AllocationStatus::Activating | AllocationStatus::Active | AllocationStatus::Halting
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Staged => "staged",
            AllocationStatus::Activating => "activating",
            AllocationStatus::Active => "active",
            AllocationStatus::Halting => "halting",
            AllocationStatus::Halted => "halted",
            AllocationStatus::Expired => "expired",
            AllocationStatus::Failed => "failed",
        }
    }
}

/// One unit of capital committed to a strategy instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub status: AllocationStatus,
    pub strategy_ref: String,
    pub session_id: String,
    pub allocation_amount: f64,
    pub ttl_until: u64,
    pub realized_pnl: f64,
    #[serde(default)]
    pub symbol_hint: Vec<String>,
    pub created_at: u64,
}

/// Performance snapshot supplied by the backtest/live metrics feed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub sharpe: f64,
    pub max_dd: f64,
    pub trades: u64,
    pub win_rate: f64,
    pub slippage_bps: f64,
}

/// Outcome of the admission gate. Deterministic for a (session, strategy)
/// pair, so cacheable indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecheckResult {
    pub ok: bool,
    pub failed: Vec<String>,
    pub metrics: StrategyMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Derived, non-stored view of the shared pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub cap_pct: f64,
    pub utilization_pct: f64,
    pub equity: f64,
    pub pool_pnl: f64,
    pub active_count: usize,
    pub available_capacity: f64,
    pub risk_level: RiskLevel,
}

/// A proposed or applied change to one allocation's amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationDiff {
    pub id: String,
    pub old_amount: f64,
    pub new_amount: f64,
}

/// Snapshot read of the whole ledger, versioned so the caller can build a
/// subsequent CAS-protected mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerView {
    pub ledger_version: u64,
    pub rows: Vec<Allocation>,
}

/// Result of a rebalance preview or execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceOutcome {
    pub ledger_version: u64,
    pub diffs: Vec<AllocationDiff>,
}
